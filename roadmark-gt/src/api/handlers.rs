//! HTTP request handlers
//!
//! Implements the REST endpoints for ingest, polling, dismissal, and
//! catalog queries. Failures map to status codes here; nothing in the
//! engine escalates to the transport.

use crate::api::AppContext;
use crate::error::Error;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use roadmark_common::detection::{DetectionFrame, VehicleTelemetry};
use roadmark_common::geo::Coordinate;
use roadmark_common::notification::{CatalogEntry, Notification};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
    live_notifications: usize,
    catalog_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    accepted: usize,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    latitude: f64,
    longitude: f64,
    radius_m: f64,
}

type HandlerError = (StatusCode, Json<StatusResponse>);

fn error_response(error: Error) -> HandlerError {
    let status = match &error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::BadRequest(_) | Error::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", error),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "geotagger".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
        live_notifications: ctx.engine.hub().len().await,
        catalog_entries: ctx.engine.catalog().len().await,
    })
}

// ============================================================================
// Inbound Collaborators
// ============================================================================

/// POST /detections - Frame-batched detection event from the detector
pub async fn post_detections(
    State(ctx): State<AppContext>,
    Json(frame): Json<DetectionFrame>,
) -> Json<IngestResponse> {
    let notifications = ctx.engine.ingest_frame(frame).await;
    info!("Ingested {} detections", notifications.len());
    Json(IngestResponse {
        accepted: notifications.len(),
        notifications,
    })
}

/// POST /telemetry - Vehicle telemetry tick from the route follower
pub async fn post_telemetry(
    State(ctx): State<AppContext>,
    Json(telemetry): Json<VehicleTelemetry>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.engine
        .telemetry_tick(telemetry)
        .await
        .map_err(error_response)?;

    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

// ============================================================================
// Observer Surface
// ============================================================================

/// GET /notifications - Full live set (polling fallback)
///
/// Re-derives coordinates for anything still unresolved before answering,
/// so a stalled push channel cannot block initial resolution.
pub async fn get_notifications(State(ctx): State<AppContext>) -> Json<NotificationsResponse> {
    Json(NotificationsResponse {
        notifications: ctx.engine.poll_notifications().await,
    })
}

/// POST /notifications/:id/dismiss - Remove a notification from the live set
pub async fn dismiss_notification(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, HandlerError> {
    if ctx.engine.dismiss(id).await {
        Ok(Json(StatusResponse {
            status: "dismissed".to_string(),
        }))
    } else {
        Err(error_response(Error::NotFound(format!(
            "notification {}",
            id
        ))))
    }
}

// ============================================================================
// Catalog Queries
// ============================================================================

/// GET /catalog - Every durable catalog entry
pub async fn get_catalog(State(ctx): State<AppContext>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        entries: ctx.engine.catalog().entries().await,
    })
}

/// GET /catalog/nearby - Entries within a radius, nearest first
pub async fn get_catalog_nearby(
    State(ctx): State<AppContext>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<CatalogResponse>, HandlerError> {
    let center = Coordinate::new(query.latitude, query.longitude);
    if !center.is_finite() || !query.radius_m.is_finite() || query.radius_m < 0.0 {
        return Err(error_response(Error::BadRequest(
            "nearby query requires finite coordinates and a non-negative radius".to_string(),
        )));
    }

    Ok(Json(CatalogResponse {
        entries: ctx.engine.catalog().nearby(center, query.radius_m).await,
    }))
}
