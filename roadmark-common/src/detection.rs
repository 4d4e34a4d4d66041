//! Detection and telemetry wire types
//!
//! Shapes match what the external collaborators send: the detector posts
//! one frame-batched JSON body per video frame, and the route follower
//! posts a telemetry tick at a fixed cadence.

use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};

/// One tracked detection within a frame, relative to the vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    /// Tracker-assigned id, stable across frames for one physical object
    pub track_id: i64,
    /// Distance ahead of the vehicle in meters
    pub forward_distance_m: f64,
    /// Lateral offset in meters, positive = right of travel direction
    pub lateral_offset_m: f64,
    /// Estimated defect area in square meters
    #[serde(default)]
    pub size_m2: f64,
    /// Explicit coordinate supplied by the detector, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
}

/// Frame-batched detection event from the detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_index: u64,
    pub detections: Vec<RawDetection>,
    /// Total frames in the source video, when known (enables
    /// frame-position interpolation onto the route path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    /// Detector-side capture timestamp, milliseconds since the epoch
    pub timestamp_ms: i64,
}

/// Vehicle telemetry tick from the route follower
///
/// Single logical writer, fixed cadence (200-500 ms). The next route
/// waypoint stands in for a measured heading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub position: Coordinate,
    pub next_waypoint: Coordinate,
}

/// Immutable copy of a detection taken at ingest time
///
/// Stored on the notification so later catalog or telemetry activity can
/// never rewrite what was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub track_id: i64,
    pub forward_distance_m: f64,
    pub lateral_offset_m: f64,
    pub size_m2: f64,
    pub frame_index: u64,
    /// frame_index / total_frames, when the detector reported a total
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_coordinate: Option<Coordinate>,
    pub timestamp_ms: i64,
}

impl DetectionSnapshot {
    /// Snapshot one detection out of its enclosing frame
    pub fn from_frame(raw: &RawDetection, frame: &DetectionFrame) -> Self {
        let frame_fraction = frame
            .total_frames
            .filter(|total| *total > 0)
            .map(|total| frame.frame_index as f64 / total as f64);

        Self {
            track_id: raw.track_id,
            forward_distance_m: raw.forward_distance_m,
            lateral_offset_m: raw.lateral_offset_m,
            size_m2: raw.size_m2,
            frame_index: frame.frame_index,
            frame_fraction,
            explicit_coordinate: raw.coordinate,
            timestamp_ms: frame.timestamp_ms,
        }
    }
}
