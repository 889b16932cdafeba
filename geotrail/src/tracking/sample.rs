//! Position samples and geolocation failures.
//!
//! - [`PositionSample`] - One reading of device position
//! - [`PositionOptions`] - Accuracy/timeout hints passed to the position source
//! - [`GeolocationError`] - Classified sensor failure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

/// One reading of device position.
///
/// Samples are produced by a [`PositionSource`](super::PositionSource) and are
/// never modified afterwards; the controller clones them where it needs to
/// remember one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Reported horizontal accuracy radius in meters.
    pub accuracy_meters: f64,

    /// When the reading was taken.
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    /// Create a new sample.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at,
        }
    }

    /// The sample's position as a coordinate.
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Coordinates formatted to six decimal places, e.g. `"53.630278, 9.988333"`.
    pub fn display_coords(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }

    /// Accuracy formatted for display, e.g. `"12 m"`.
    pub fn display_accuracy(&self) -> String {
        format!("{:.0} m", self.accuracy_meters)
    }
}

/// Hints passed to the position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Prefer a high-accuracy fix (GPS) over a coarse one.
    pub high_accuracy: bool,

    /// Give up on a single fix after this many milliseconds.
    pub timeout_ms: u64,

    /// Accept a cached fix no older than this (0 = always fresh).
    pub max_cache_age_ms: u64,
}

impl PositionOptions {
    /// Options for the one-shot fix taken when tracking starts.
    pub const INITIAL: Self = Self {
        high_accuracy: true,
        timeout_ms: 15_000,
        max_cache_age_ms: 0,
    };

    /// Options for the continuous watch.
    pub const WATCH: Self = Self {
        high_accuracy: true,
        timeout_ms: 10_000,
        max_cache_age_ms: 0,
    };
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::WATCH
    }
}

/// Classification of geolocation failures.
///
/// The numeric codes follow the W3C Geolocation API so that platform
/// adapters can convert directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeolocationErrorKind {
    /// The user or platform refused location access. Fatal to the session.
    PermissionDenied,
    /// No fix could be obtained (no signal, sensor off).
    PositionUnavailable,
    /// A fix was not obtained within the timeout.
    Timeout,
    /// Anything else.
    Unknown,
}

impl GeolocationErrorKind {
    /// Map a W3C `GeolocationPositionError.code` to a kind.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Whether this error ends the tracking session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Location access was denied. Enable location services and restart tracking."
            }
            Self::PositionUnavailable => {
                "Location information is unavailable. Check device settings or move to a spot with better GPS signal."
            }
            Self::Timeout => "The request to get your location timed out. Tracking will keep trying.",
            Self::Unknown => "An unknown error occurred while tracking location.",
        }
    }
}

impl std::fmt::Display for GeolocationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "PermissionDenied"),
            Self::PositionUnavailable => write!(f, "PositionUnavailable"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A failure reported by the position source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GeolocationError {
    /// Classified failure kind.
    pub kind: GeolocationErrorKind,

    /// Platform-provided detail.
    pub message: String,
}

impl GeolocationError {
    /// Create a new error.
    pub fn new(kind: GeolocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a permission-denied error.
    pub fn permission_denied() -> Self {
        Self::new(GeolocationErrorKind::PermissionDenied, "User denied geolocation")
    }

    /// Shorthand for a timeout error.
    pub fn timeout() -> Self {
        Self::new(GeolocationErrorKind::Timeout, "Timeout expired")
    }

    /// Shorthand for a position-unavailable error.
    pub fn unavailable() -> Self {
        Self::new(
            GeolocationErrorKind::PositionUnavailable,
            "Position unavailable",
        )
    }
}
