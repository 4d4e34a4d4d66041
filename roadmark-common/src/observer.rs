//! Observer-side reconciliation of the live notification set
//!
//! Both observer kinds maintain the same id-keyed view: push observers
//! feed it SSE events, polling observers feed it full snapshots, and a
//! reconnecting observer may do both in either order. Applying is
//! idempotent by notification id, per-field updates are last-writer-wins
//! on `updated_at`, and replay after reconnect is harmless.

use crate::events::GeotagEvent;
use crate::notification::Notification;
use std::collections::HashMap;
use uuid::Uuid;

/// An observer's local copy of the live notification set
#[derive(Debug, Default)]
pub struct ObserverView {
    notifications: HashMap<Uuid, Notification>,
}

impl ObserverView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one push-channel event
    pub fn apply_event(&mut self, event: &GeotagEvent) {
        match event {
            GeotagEvent::NotificationDismissed { id, .. } => {
                self.notifications.remove(id);
            }
            GeotagEvent::Detected { notification, .. }
            | GeotagEvent::ExistingAlert { notification, .. }
            | GeotagEvent::DistanceUpdated { notification, .. }
            | GeotagEvent::CoordinateUpdated { notification, .. } => {
                self.merge(notification);
            }
        }
    }

    /// Reconcile against a full polling response
    ///
    /// Ids absent from the snapshot leave the view; present ids merge
    /// field-wise like any other mutation.
    pub fn apply_snapshot(&mut self, snapshot: &[Notification]) {
        self.notifications
            .retain(|id, _| snapshot.iter().any(|n| n.id == *id));
        for notification in snapshot {
            self.merge(notification);
        }
    }

    /// Idempotent per-id merge with last-writer-wins on `updated_at`
    fn merge(&mut self, incoming: &Notification) {
        match self.notifications.get_mut(&incoming.id) {
            None => {
                self.notifications.insert(incoming.id, incoming.clone());
            }
            Some(local) => {
                if incoming.updated_at < local.updated_at {
                    // Stale replay
                    return;
                }
                // A coordinate, once set, never changes for an id
                if local.coordinate.is_none() {
                    local.coordinate = incoming.coordinate;
                }
                local.current_distance_m = incoming.current_distance_m;
                local.phase = incoming.phase;
                local.verdict = incoming.verdict;
                local.updated_at = incoming.updated_at;
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&Notification> {
        self.notifications.get(id)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Contents sorted by id, for order-insensitive comparison
    pub fn contents(&self) -> Vec<&Notification> {
        let mut all: Vec<&Notification> = self.notifications.values().collect();
        all.sort_by_key(|n| n.id);
        all
    }

    /// Whether two observers have converged on the same live set
    pub fn converged_with(&self, other: &ObserverView) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.notifications.iter().all(|(id, local)| {
            other.get(id).is_some_and(|remote| {
                local.coordinate == remote.coordinate
                    && local.current_distance_m == remote.current_distance_m
                    && local.phase == remote.phase
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionSnapshot;
    use crate::geo::Coordinate;
    use crate::notification::NotificationPhase;
    use chrono::{Duration, Utc};

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

    #[test]
    fn test_event_replay_is_idempotent() {
        let n = notification();
        let event = GeotagEvent::Detected {
            notification: n.clone(),
            timestamp: Utc::now(),
        };

        let mut view = ObserverView::new();
        view.apply_event(&event);
        view.apply_event(&event);
        view.apply_event(&event);

        assert_eq!(view.len(), 1);
        assert_eq!(view.get(&n.id).unwrap().id, n.id);
    }

    #[test]
    fn test_stale_event_does_not_overwrite() {
        let mut newer = notification();
        newer.current_distance_m = Some(12.0);
        newer.updated_at = Utc::now();

        let mut stale = newer.clone();
        stale.current_distance_m = Some(99.0);
        stale.updated_at = newer.updated_at - Duration::seconds(5);

        let mut view = ObserverView::new();
        view.apply_event(&GeotagEvent::DistanceUpdated {
            notification: newer.clone(),
            timestamp: newer.updated_at,
        });
        view.apply_event(&GeotagEvent::DistanceUpdated {
            notification: stale,
            timestamp: Utc::now(),
        });

        assert_eq!(view.get(&newer.id).unwrap().current_distance_m, Some(12.0));
    }

    #[test]
    fn test_coordinate_is_immutable_once_set() {
        let mut resolved = notification();
        resolved.coordinate = Some(Coordinate::new(1.0, 2.0));
        resolved.phase = NotificationPhase::DistanceTracking;

        let mut view = ObserverView::new();
        view.apply_event(&GeotagEvent::CoordinateUpdated {
            notification: resolved.clone(),
            timestamp: Utc::now(),
        });

        let mut moved = resolved.clone();
        moved.coordinate = Some(Coordinate::new(3.0, 4.0));
        moved.updated_at = resolved.updated_at + Duration::seconds(1);
        view.apply_event(&GeotagEvent::CoordinateUpdated {
            notification: moved,
            timestamp: Utc::now(),
        });

        assert_eq!(
            view.get(&resolved.id).unwrap().coordinate,
            Some(Coordinate::new(1.0, 2.0))
        );
    }

    #[test]
    fn test_snapshot_drops_absent_ids() {
        let kept = notification();
        let dropped = notification();

        let mut view = ObserverView::new();
        view.apply_event(&GeotagEvent::Detected {
            notification: kept.clone(),
            timestamp: Utc::now(),
        });
        view.apply_event(&GeotagEvent::Detected {
            notification: dropped.clone(),
            timestamp: Utc::now(),
        });
        assert_eq!(view.len(), 2);

        view.apply_snapshot(&[kept.clone()]);
        assert_eq!(view.len(), 1);
        assert!(view.get(&dropped.id).is_none());
    }

    #[test]
    fn test_dismissal_removes_from_view() {
        let n = notification();
        let mut view = ObserverView::new();
        view.apply_event(&GeotagEvent::Detected {
            notification: n.clone(),
            timestamp: Utc::now(),
        });
        view.apply_event(&GeotagEvent::NotificationDismissed {
            id: n.id,
            timestamp: Utc::now(),
        });
        assert!(view.is_empty());
    }

    #[test]
    fn test_push_and_poll_views_converge() {
        let mut n = notification();
        n.coordinate = Some(Coordinate::new(0.5, 0.5));
        n.current_distance_m = Some(42.0);
        n.phase = NotificationPhase::DistanceTracking;

        let mut push_view = ObserverView::new();
        push_view.apply_event(&GeotagEvent::Detected {
            notification: n.clone(),
            timestamp: Utc::now(),
        });

        let mut poll_view = ObserverView::new();
        poll_view.apply_snapshot(&[n]);

        assert!(push_view.converged_with(&poll_view));
        assert!(poll_view.converged_with(&push_view));
    }
}
