//! Geographic coordinate types

use thiserror::Error;

/// Valid latitude range in degrees
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range in degrees
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Mean Earth radius used by the great-circle formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate without validation.
    ///
    /// Use [`Coordinate::try_new`] when the values come from untrusted input.
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(MIN_LON..=MAX_LON).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self::new(latitude, longitude))
    }

    /// Returns true if both components are finite and within range.
    #[inline]
    pub fn is_valid(&self) -> bool {
        Self::try_new(self.latitude, self.longitude).is_ok()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Errors produced when validating coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude is not finite or outside -90..=90
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),
    /// Longitude is not finite or outside -180..=180
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),
}
