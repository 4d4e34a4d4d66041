//! Event types and EventBus for the RoadMark push channel
//!
//! Events are broadcast via the EventBus and serialized for SSE
//! transmission. Every event that mutates a notification carries the full
//! notification snapshot, so applying one is idempotent by id: observers
//! that already hold the id take only the changed fields.

use crate::notification::Notification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// RoadMark event types
///
/// Broadcast to push observers and replayable without harm: ids are
/// stable and per-field updates are last-writer-wins on `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeotagEvent {
    /// A resolved detection created a new catalog entry
    Detected {
        notification: Notification,
        timestamp: DateTime<Utc>,
    },

    /// A resolved detection matched an existing catalog entry
    ExistingAlert {
        notification: Notification,
        /// Whether the hysteresis buffer consolidated on this match
        count_incremented: bool,
        timestamp: DateTime<Utc>,
    },

    /// Periodic vehicle-to-defect distance recompute
    DistanceUpdated {
        notification: Notification,
        timestamp: DateTime<Utc>,
    },

    /// Late resolution of a previously pending coordinate
    CoordinateUpdated {
        notification: Notification,
        timestamp: DateTime<Utc>,
    },

    /// A notification left the live set by explicit observer action
    NotificationDismissed {
        id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl GeotagEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GeotagEvent::Detected { .. } => "detected",
            GeotagEvent::ExistingAlert { .. } => "existing_alert",
            GeotagEvent::DistanceUpdated { .. } => "distance_updated",
            GeotagEvent::CoordinateUpdated { .. } => "coordinate_updated",
            GeotagEvent::NotificationDismissed { .. } => "notification_dismissed",
        }
    }

    /// Id of the notification the event concerns
    pub fn notification_id(&self) -> Uuid {
        match self {
            GeotagEvent::Detected { notification, .. }
            | GeotagEvent::ExistingAlert { notification, .. }
            | GeotagEvent::DistanceUpdated { notification, .. }
            | GeotagEvent::CoordinateUpdated { notification, .. } => notification.id,
            GeotagEvent::NotificationDismissed { id, .. } => *id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers never block the producer)
/// - Multiple concurrent subscribers
/// - Lagged-message detection for slow subscribers, which then recover
///   through the polling fallback
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GeotagEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GeotagEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GeotagEvent,
    ) -> Result<usize, broadcast::error::SendError<GeotagEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Delivery to observers is fire-and-forget relative to ingestion.
    pub fn emit_lossy(&self, event: GeotagEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
