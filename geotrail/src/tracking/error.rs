//! Errors returned by tracking operations.

use thiserror::Error;

use super::renderer::RenderError;
use super::sample::GeolocationError;

/// Errors returned from controller and service operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// The device has no geolocation capability.
    #[error("Geolocation is not available on this device")]
    CapabilityUnavailable,

    /// The continuous watch could not be registered.
    #[error("Failed to start location watch: {0}")]
    Watch(GeolocationError),

    /// No history entry at the requested index.
    #[error("No history entry at index {0}")]
    NoSuchHistoryEntry(usize),

    /// The map could not show the requested position.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The tracking service has shut down.
    #[error("Tracking service is not running")]
    ServiceStopped,
}
