//! Notification model and catalog record types
//!
//! A notification is a live alert owned by the hub; a catalog entry is a
//! durable record of a distinct physical defect. Their lifecycles are
//! independent: dismissing a notification never touches the catalog.

use crate::detection::DetectionSnapshot;
use crate::geo::Coordinate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification lifecycle phase
///
/// `PendingCoordinate -> Resolved -> DistanceTracking (self-loop) -> Dismissed`.
/// `Resolved` is transient: a notification moves to `DistanceTracking` on
/// the first distance recompute after its coordinate commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPhase {
    /// No coordinate yet; resolution retried on every telemetry tick
    PendingCoordinate,
    /// Coordinate committed, distance not yet computed
    Resolved,
    /// Coordinate committed and distance tracked per tick
    DistanceTracking,
    /// Terminal; entered only by explicit observer action
    Dismissed,
}

/// What the catalog said about a resolved detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CatalogVerdict {
    /// No entry within the duplicate radius; a new one was created
    NewEntry,
    /// Matched an existing entry beyond the noise radius
    ExistingMatch { count_incremented: bool },
    /// Matched within the noise radius; jitter, not separately counted
    NoiseRepeat,
}

/// A live alert as held in the hub and shown to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub detection: DetectionSnapshot,
    /// Resolved coordinate; immutable once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    /// Great-circle distance from the vehicle, recomputed per tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_distance_m: Option<f64>,
    pub phase: NotificationPhase,
    /// Catalog verdict from the merge that accompanied resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<CatalogVerdict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a fresh notification for a snapshotted detection
    pub fn new(detection: DetectionSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            detection,
            coordinate: None,
            current_distance_m: None,
            phase: NotificationPhase::PendingCoordinate,
            verdict: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.phase == NotificationPhase::PendingCoordinate
    }

    pub fn is_dismissed(&self) -> bool {
        self.phase == NotificationPhase::Dismissed
    }
}

/// Durable record of one distinct physical defect
///
/// The coordinate never moves after creation; later matching detections
/// update metadata only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub coordinate: Coordinate,
    /// Forward distance of the detection that created the entry
    pub distance_m: f64,
    /// Lateral offset of the detection that created the entry
    pub lateral_m: f64,
    /// Largest observed defect area
    pub size_m2: f64,
    pub detection_count: u32,
    /// Hysteresis buffer: qualifying detections awaiting consolidation
    pub pending_detections: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
