//! Geotagging engine: detection ingest and telemetry reconciliation
//!
//! Owns the catalog, the notification hub, and the vehicle tracker, and
//! drives the pipeline: raw detection in, resolved + deduplicated
//! notification out. Constructed once at startup and passed into the API
//! layer; tests build their own instances, which never interfere.
//!
//! Vehicle telemetry has a single logical writer: every
//! coordinate-resolution and distance-recompute pass runs under one
//! reconcile lock, so there are no races on "current heading".

use crate::catalog::PotholeCatalog;
use crate::config::RuntimeSettings;
use crate::error::{Error, Result};
use crate::hub::NotificationHub;
use crate::resolver::{self, RoutePath};
use chrono::{DateTime, Utc};
use roadmark_common::detection::{DetectionFrame, DetectionSnapshot, VehicleTelemetry};
use roadmark_common::events::GeotagEvent;
use roadmark_common::geo;
use roadmark_common::notification::{Notification, NotificationPhase};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Central pipeline object tying resolution, deduplication, and
/// distribution together
pub struct GeotagEngine {
    hub: NotificationHub,
    catalog: PotholeCatalog,
    vehicle: RwLock<Option<VehicleTelemetry>>,
    route: RwLock<RoutePath>,
    /// Serializes reconciliation passes (telemetry tick and polling
    /// re-derivation)
    reconcile_lock: Mutex<()>,
    /// Detections carrying non-finite or out-of-range coordinates,
    /// rejected at the ingest boundary
    invalid_coordinates: AtomicU64,
}

impl GeotagEngine {
    pub fn new(catalog: PotholeCatalog, settings: &RuntimeSettings) -> Self {
        Self {
            hub: NotificationHub::new(settings.sse_buffer_capacity),
            catalog,
            vehicle: RwLock::new(None),
            route: RwLock::new(RoutePath::default()),
            reconcile_lock: Mutex::new(()),
            invalid_coordinates: AtomicU64::new(0),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn catalog(&self) -> &PotholeCatalog {
        &self.catalog
    }

    pub fn invalid_coordinate_count(&self) -> u64 {
        self.invalid_coordinates.load(Ordering::Relaxed)
    }

    /// Ingest one frame-batched detection event
    ///
    /// Every detection yields a registered notification, resolved or not:
    /// unresolved ones stay pending and are retried on later ticks rather
    /// than lost.
    pub async fn ingest_frame(&self, frame: DetectionFrame) -> Vec<Notification> {
        let now = Utc::now();
        let vehicle = *self.vehicle.read().await;
        let route = self.route.read().await.clone();

        let mut notifications = Vec::with_capacity(frame.detections.len());
        for raw in &frame.detections {
            let mut snapshot = DetectionSnapshot::from_frame(raw, &frame);

            // Reject detector-supplied coordinates that fail validation;
            // the detection itself survives through the remaining tiers
            if let Some(explicit) = snapshot.explicit_coordinate {
                if !explicit.is_finite() {
                    self.invalid_coordinates.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Rejected invalid explicit coordinate for track {}: ({}, {})",
                        raw.track_id, explicit.latitude, explicit.longitude
                    );
                    snapshot.explicit_coordinate = None;
                }
            }

            let mut notification = Notification::new(snapshot, now);

            match resolver::resolve(&notification.detection, vehicle.as_ref(), &route) {
                Some(coordinate) => {
                    let outcome = self
                        .catalog
                        .add_or_merge(coordinate, &notification.detection)
                        .await;

                    notification.coordinate = Some(coordinate);
                    notification.verdict = Some(outcome.verdict);
                    notification.phase = NotificationPhase::Resolved;

                    if let Some(v) = vehicle {
                        notification.current_distance_m =
                            Some(geo::distance(v.position, coordinate));
                        notification.phase = NotificationPhase::DistanceTracking;
                    }

                    self.hub.register(notification.clone()).await;

                    let event = if outcome.is_new_entry() {
                        GeotagEvent::Detected {
                            notification: notification.clone(),
                            timestamp: now,
                        }
                    } else {
                        GeotagEvent::ExistingAlert {
                            notification: notification.clone(),
                            count_incremented: outcome.count_incremented(),
                            timestamp: now,
                        }
                    };
                    self.hub.publish(event);
                }
                None => {
                    // Missing pose: defer, never surface as an error. No
                    // event kind exists for an unresolved notification, so
                    // until resolution it is visible on the polling surface
                    // only; push observers first see it as coordinate_updated
                    debug!(
                        "No pose for track {}; notification {} pending",
                        raw.track_id, notification.id
                    );
                    self.hub.register(notification.clone()).await;
                }
            }

            notifications.push(notification);
        }

        notifications
    }

    /// Apply one vehicle telemetry tick
    ///
    /// Updates the tracked pose and route path, then runs the
    /// reconciliation pass: pending notifications get one more resolution
    /// attempt, tracked notifications get a fresh vehicle distance.
    pub async fn telemetry_tick(&self, telemetry: VehicleTelemetry) -> Result<()> {
        if !telemetry.position.is_finite() || !telemetry.next_waypoint.is_finite() {
            self.invalid_coordinates.fetch_add(1, Ordering::Relaxed);
            return Err(Error::InvalidCoordinate(
                "telemetry position or waypoint out of range".to_string(),
            ));
        }

        let _guard = self.reconcile_lock.lock().await;
        let now = Utc::now();

        *self.vehicle.write().await = Some(telemetry);
        self.route.write().await.record(telemetry.position);

        // Distance recompute targets captured before late resolutions so a
        // freshly resolved notification is not updated twice in one tick
        let tracked = self.hub.tracked().await;

        self.resolve_pending(telemetry, now).await;

        for notification in tracked {
            let Some(coordinate) = notification.coordinate else {
                continue;
            };
            let distance_m = geo::distance(telemetry.position, coordinate);
            if let Some(updated) = self.hub.update_distance(notification.id, distance_m, now).await
            {
                self.hub.publish(GeotagEvent::DistanceUpdated {
                    notification: updated,
                    timestamp: now,
                });
            }
        }

        Ok(())
    }

    /// One resolution attempt for every pending notification
    ///
    /// Successful resolutions run the catalog merge and reach push
    /// observers as `coordinate_updated`.
    async fn resolve_pending(&self, telemetry: VehicleTelemetry, now: DateTime<Utc>) {
        let route = self.route.read().await.clone();

        for pending in self.hub.pending().await {
            let Some(coordinate) =
                resolver::resolve(&pending.detection, Some(&telemetry), &route)
            else {
                continue;
            };

            let outcome = self
                .catalog
                .add_or_merge(coordinate, &pending.detection)
                .await;

            if self
                .hub
                .commit_resolution(pending.id, coordinate, outcome.verdict, now)
                .await
                .is_none()
            {
                // Dismissed between snapshot and commit
                continue;
            }

            let distance_m = geo::distance(telemetry.position, coordinate);
            if let Some(updated) = self.hub.update_distance(pending.id, distance_m, now).await {
                info!("Late resolution for notification {}", pending.id);
                self.hub.publish(GeotagEvent::CoordinateUpdated {
                    notification: updated,
                    timestamp: now,
                });
            }
        }
    }

    /// Polling fallback: full live set, re-deriving coordinates first
    ///
    /// The poll path runs its own resolution attempt for anything still
    /// unresolved, so a stalled push channel cannot block initial
    /// resolution.
    pub async fn poll_notifications(&self) -> Vec<Notification> {
        let vehicle = *self.vehicle.read().await;
        if let Some(telemetry) = vehicle {
            let _guard = self.reconcile_lock.lock().await;
            self.resolve_pending(telemetry, Utc::now()).await;
        }
        self.hub.snapshot().await
    }

    /// Dismiss a notification by explicit observer action
    ///
    /// Removes it from the live set without touching any catalog entry.
    pub async fn dismiss(&self, id: Uuid) -> bool {
        self.hub.dismiss(id, Utc::now()).await
    }

    /// Currently tracked vehicle pose, if any telemetry has arrived
    pub async fn vehicle(&self) -> Option<VehicleTelemetry> {
        *self.vehicle.read().await
    }
}
