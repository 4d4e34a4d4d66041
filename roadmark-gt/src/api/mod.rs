//! HTTP API for the geotagger
//!
//! Inbound collaborators (detector, route follower) and observers share
//! one axum surface: detection/telemetry webhooks, the polling fallback,
//! dismissal, catalog queries, and the SSE push channel.

pub mod handlers;
pub mod sse;

use crate::engine::GeotagEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<GeotagEngine>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))

        // Inbound collaborators
        .route("/detections", post(handlers::post_detections))
        .route("/telemetry", post(handlers::post_telemetry))

        // Observer surface
        .route("/notifications", get(handlers::get_notifications))
        .route("/notifications/:id/dismiss", post(handlers::dismiss_notification))

        // Catalog queries
        .route("/catalog", get(handlers::get_catalog))
        .route("/catalog/nearby", get(handlers::get_catalog_nearby))

        // SSE push channel
        .route("/events", get(sse::event_stream))

        // Attach application context
        .with_state(ctx)

        // Request tracing + CORS for local observers
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
