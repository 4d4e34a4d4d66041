//! Coordinate resolution for relative detections
//!
//! Converts "D meters ahead, X meters to the side" into an absolute
//! coordinate using a tiered precedence policy. Each tier is attempted
//! only when the prior tier's required inputs are absent:
//!
//! 1. explicit coordinate supplied by the detector (authoritative)
//! 2. frame-position interpolation onto the route path traced so far
//! 3. dead reckoning from current telemetry
//! 4. current vehicle position as a last resort
//!
//! Resolution failure is never an error: the caller defers the
//! notification to the pending state and retries on the next telemetry
//! tick.

use roadmark_common::detection::{DetectionSnapshot, VehicleTelemetry};
use roadmark_common::geo::{self, Coordinate};

/// Headings are degenerate below this separation between vehicle and
/// heading reference
const MIN_HEADING_BASELINE_M: f64 = 1e-3;

/// The polyline of positions the telemetry writer has traced
///
/// Bounded ring, newest last; consecutive duplicate positions are not
/// recorded so the polyline always makes forward progress.
#[derive(Debug, Clone)]
pub struct RoutePath {
    points: Vec<Coordinate>,
    max_points: usize,
}

impl Default for RoutePath {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl RoutePath {
    pub fn new(max_points: usize) -> Self {
        Self {
            points: Vec::new(),
            max_points: max_points.max(2),
        }
    }

    /// Record a telemetry position at the end of the path
    pub fn record(&mut self, position: Coordinate) {
        if let Some(last) = self.points.last() {
            if *last == position {
                return;
            }
        }
        if self.points.len() == self.max_points {
            self.points.remove(0);
        }
        self.points.push(position);
    }

    /// Interpolate a fractional position [0, 1] onto the path
    ///
    /// Returns None until at least two vertices exist; a fraction outside
    /// [0, 1] clamps to the endpoints.
    pub fn interpolate(&self, fraction: f64) -> Option<Coordinate> {
        if self.points.len() < 2 || !fraction.is_finite() {
            return None;
        }

        let scaled = fraction.clamp(0.0, 1.0) * (self.points.len() - 1) as f64;
        let idx = (scaled.floor() as usize).min(self.points.len() - 2);
        let t = scaled - idx as f64;

        let a = self.points[idx];
        let b = self.points[idx + 1];
        Some(Coordinate::new(
            a.latitude + (b.latitude - a.latitude) * t,
            a.longitude + (b.longitude - a.longitude) * t,
        ))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Dead-reckon an absolute coordinate from vehicle pose plus relative
/// offsets
///
/// Projects forward along the vehicle heading (taken from the next route
/// waypoint), then perpendicular by the lateral offset: positive offsets
/// fall to the right of the travel direction. Returns None when the
/// heading reference coincides with the vehicle position (degenerate
/// bearing).
pub fn dead_reckon(
    vehicle: Coordinate,
    heading_ref: Coordinate,
    forward_m: f64,
    lateral_m: f64,
) -> Option<Coordinate> {
    if geo::distance(vehicle, heading_ref) < MIN_HEADING_BASELINE_M {
        return None;
    }

    let heading = geo::bearing(vehicle, heading_ref);
    let forward_point = geo::destination(vehicle, heading, forward_m);

    if lateral_m == 0.0 {
        return Some(forward_point);
    }

    let side_bearing = if lateral_m >= 0.0 {
        (heading + 90.0) % 360.0
    } else {
        (heading + 270.0) % 360.0
    };
    Some(geo::destination(forward_point, side_bearing, lateral_m.abs()))
}

/// Resolve a detection snapshot through the tiered precedence policy
pub fn resolve(
    detection: &DetectionSnapshot,
    vehicle: Option<&VehicleTelemetry>,
    route: &RoutePath,
) -> Option<Coordinate> {
    // Tier 1: detector-supplied coordinate is authoritative
    if let Some(explicit) = detection.explicit_coordinate {
        return Some(explicit);
    }

    // Tier 2: frame position mapped onto the route path
    if let Some(fraction) = detection.frame_fraction {
        if let Some(interpolated) = route.interpolate(fraction) {
            return Some(interpolated);
        }
    }

    let vehicle = vehicle?;

    // Tier 3: dead reckoning from current telemetry
    if let Some(resolved) = dead_reckon(
        vehicle.position,
        vehicle.next_waypoint,
        detection.forward_distance_m,
        detection.lateral_offset_m,
    ) {
        return Some(resolved);
    }

    // Tier 4: vehicle position itself
    Some(vehicle.position)
}
