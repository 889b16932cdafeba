//! Great-circle distance and movement significance.
//!
//! The tracking loop only persists a sample when the device has moved far
//! enough from the last persisted sample. This module provides the pure
//! distance function and the threshold check built on it.

mod types;

pub use types::{
    Coordinate, GeoError, EARTH_RADIUS_METERS, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON,
};

/// Default movement threshold in meters.
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = 5.0;

/// Computes the haversine distance between two coordinates in meters.
///
/// Returns `0.0` if either coordinate is invalid (non-finite or out of range),
/// so that bad input is never treated as significant movement.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1.0 for antipodal points
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Decides whether a new position is far enough from the last persisted one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceFilter {
    min_distance_meters: f64,
}

impl DistanceFilter {
    /// Create a filter with the given threshold in meters.
    pub fn new(min_distance_meters: f64) -> Self {
        Self {
            min_distance_meters,
        }
    }

    /// The threshold in meters.
    pub fn min_distance_meters(&self) -> f64 {
        self.min_distance_meters
    }

    /// Returns true when `candidate` should be persisted.
    ///
    /// With no previous position every candidate is significant. Otherwise the
    /// distance must strictly exceed the threshold; a `NaN` distance never does.
    pub fn is_significant(&self, previous: Option<&Coordinate>, candidate: &Coordinate) -> bool {
        match previous {
            None => true,
            Some(prev) => {
                let distance = haversine_distance(prev, candidate);
                !distance.is_nan() && distance > self.min_distance_meters
            }
        }
    }
}

impl Default for DistanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DISTANCE_METERS)
    }
}
