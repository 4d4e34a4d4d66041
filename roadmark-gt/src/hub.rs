//! Live notification set and push-channel distribution
//!
//! Holds the set of currently active notifications and broadcasts
//! mutations to push observers. Delivery is fire-and-forget relative to
//! ingestion: a slow or disconnected observer loses events (and recovers
//! through the polling fallback) but never blocks the producer.

use chrono::{DateTime, Utc};
use roadmark_common::events::{EventBus, GeotagEvent};
use roadmark_common::geo::Coordinate;
use roadmark_common::notification::{CatalogVerdict, Notification, NotificationPhase};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Live set of active notifications plus the event bus feeding push
/// observers
pub struct NotificationHub {
    live: RwLock<HashMap<Uuid, Notification>>,
    events: EventBus,
}

impl NotificationHub {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            events: EventBus::new(event_capacity),
        }
    }

    /// Subscribe to the push channel
    pub fn subscribe(&self) -> broadcast::Receiver<GeotagEvent> {
        self.events.subscribe()
    }

    /// Publish an event to push observers, losing it if nobody listens
    pub fn publish(&self, event: GeotagEvent) {
        self.events.emit_lossy(event);
    }

    /// Add a notification to the live set
    ///
    /// Registration happens even when resolution failed, so unresolved
    /// detections are retried on later ticks rather than lost.
    pub async fn register(&self, notification: Notification) {
        self.live
            .write()
            .await
            .insert(notification.id, notification);
    }

    /// Commit a resolved coordinate and catalog verdict for an id
    ///
    /// The coordinate is immutable once set: a second commit for the same
    /// id leaves the stored coordinate untouched. Returns the updated
    /// notification, or None for unknown/dismissed ids.
    pub async fn commit_resolution(
        &self,
        id: Uuid,
        coordinate: Coordinate,
        verdict: CatalogVerdict,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let mut live = self.live.write().await;
        let notification = live.get_mut(&id)?;

        if notification.coordinate.is_none() {
            notification.coordinate = Some(coordinate);
        }
        notification.verdict = Some(verdict);
        notification.phase = NotificationPhase::Resolved;
        notification.updated_at = now;
        Some(notification.clone())
    }

    /// Record a fresh vehicle-to-defect distance for an id
    ///
    /// Moves the notification into distance tracking; self-transition on
    /// every later tick.
    pub async fn update_distance(
        &self,
        id: Uuid,
        distance_m: f64,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let mut live = self.live.write().await;
        let notification = live.get_mut(&id)?;

        notification.current_distance_m = Some(distance_m);
        notification.phase = NotificationPhase::DistanceTracking;
        notification.updated_at = now;
        Some(notification.clone())
    }

    /// Remove a notification by explicit observer action
    ///
    /// Terminal; touches no catalog state. Returns false for unknown ids.
    pub async fn dismiss(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let removed = self.live.write().await.remove(&id).is_some();
        if removed {
            debug!("Notification {} dismissed", id);
            self.publish(GeotagEvent::NotificationDismissed { id, timestamp: now });
        }
        removed
    }

    /// Full live set, for the polling fallback
    pub async fn snapshot(&self) -> Vec<Notification> {
        self.live.read().await.values().cloned().collect()
    }

    /// Notifications still awaiting a coordinate
    pub async fn pending(&self) -> Vec<Notification> {
        self.live
            .read()
            .await
            .values()
            .filter(|n| n.is_pending())
            .cloned()
            .collect()
    }

    /// Notifications with a committed coordinate
    pub async fn tracked(&self) -> Vec<Notification> {
        self.live
            .read()
            .await
            .values()
            .filter(|n| n.coordinate.is_some())
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<Notification> {
        self.live.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmark_common::detection::DetectionSnapshot;

    fn notification() -> Notification {
        Notification::new(
            DetectionSnapshot {
                track_id: 1,
                forward_distance_m: 10.0,
                lateral_offset_m: 0.0,
                size_m2: 0.02,
                frame_index: 0,
                frame_fraction: None,
                explicit_coordinate: None,
                timestamp_ms: 0,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let hub = NotificationHub::new(16);
        let n = notification();
        hub.register(n.clone()).await;

        let snapshot = hub.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, n.id);
        assert_eq!(hub.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_coordinate_immutable_after_first_commit() {
        let hub = NotificationHub::new(16);
        let n = notification();
        hub.register(n.clone()).await;

        let first = Coordinate::new(1.0, 2.0);
        hub.commit_resolution(n.id, first, CatalogVerdict::NewEntry, Utc::now())
            .await
            .unwrap();

        let second = hub
            .commit_resolution(
                n.id,
                Coordinate::new(3.0, 4.0),
                CatalogVerdict::NoiseRepeat,
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(second.coordinate, Some(first));
    }

    #[tokio::test]
    async fn test_distance_update_enters_tracking() {
        let hub = NotificationHub::new(16);
        let n = notification();
        hub.register(n.clone()).await;
        hub.commit_resolution(n.id, Coordinate::new(0.0, 0.0), CatalogVerdict::NewEntry, Utc::now())
            .await
            .unwrap();

        let updated = hub.update_distance(n.id, 12.5, Utc::now()).await.unwrap();
        assert_eq!(updated.phase, NotificationPhase::DistanceTracking);
        assert_eq!(updated.current_distance_m, Some(12.5));
        assert!(hub.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_removes_and_broadcasts() {
        let hub = NotificationHub::new(16);
        let mut rx = hub.subscribe();

        let n = notification();
        hub.register(n.clone()).await;

        assert!(hub.dismiss(n.id, Utc::now()).await);
        assert!(hub.is_empty().await);
        assert!(!hub.dismiss(n.id, Utc::now()).await, "second dismissal is a no-op");

        let event = rx.try_recv().expect("dismissal event");
        assert_eq!(event.event_type(), "notification_dismissed");
        assert_eq!(event.notification_id(), n.id);
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let hub = NotificationHub::new(16);
        assert!(hub
            .commit_resolution(
                Uuid::new_v4(),
                Coordinate::new(0.0, 0.0),
                CatalogVerdict::NewEntry,
                Utc::now()
            )
            .await
            .is_none());
        assert!(hub.update_distance(Uuid::new_v4(), 1.0, Utc::now()).await.is_none());
    }
}
