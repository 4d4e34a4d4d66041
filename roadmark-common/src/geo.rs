//! Spherical geometry over WGS-style latitude/longitude coordinates
//!
//! Provides the three primitives the geotagging pipeline is built on:
//! initial great-circle bearing, destination projection, and haversine
//! distance. All three are pure and total for finite inputs; non-finite
//! inputs propagate through to non-finite outputs rather than erroring,
//! so validation happens at the ingest and persistence boundaries via
//! [`Coordinate::is_finite`].

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within geographic range
    ///
    /// Used to reject detector-supplied coordinates before they reach the
    /// catalog; the geometry functions themselves do not validate.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Initial great-circle bearing from `a` to `b`, in degrees [0, 360)
///
/// 0 = north, 90 = east, following the compass convention.
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Point reached by traveling `distance_m` meters from `from` along
/// `bearing_deg`
///
/// Great-circle projection on a sphere of mean Earth radius. Longitude is
/// normalized to [-180, 180].
pub fn destination(from: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let phi1 = from.latitude.to_radians();
    let lambda1 = from.longitude.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M; // angular distance

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let mut longitude = lambda2.to_degrees();
    if longitude.is_finite() {
        longitude = (longitude + 540.0) % 360.0 - 180.0;
    }

    Coordinate {
        latitude: phi2.to_degrees(),
        longitude,
    }
}

/// Haversine great-circle distance between `a` and `b`, in meters
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
