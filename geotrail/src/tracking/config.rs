//! Runtime configuration for the tracking controller.

use std::time::Duration;

use super::history::DEFAULT_HISTORY_CAPACITY;
use super::retry::{DEFAULT_MAX_RENDER_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
use super::sample::PositionOptions;
use crate::geo::DEFAULT_MIN_DISTANCE_METERS;

/// Default heartbeat tick interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Staleness threshold as a multiple of the heartbeat interval.
pub const HEARTBEAT_STALE_FACTOR: u32 = 3;

/// Settings for one [`TrackingController`](super::TrackingController).
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Heartbeat tick interval.
    pub heartbeat_interval: Duration,

    /// Minimum movement before a sample is persisted again.
    pub min_distance_meters: f64,

    /// Options for the one-shot fix requested on start.
    pub initial_options: PositionOptions,

    /// Options for the continuous watch.
    pub watch_options: PositionOptions,

    /// Interval between map reinitialisation attempts.
    pub render_retry_interval: Duration,

    /// Render failures tolerated before falling back.
    pub max_render_attempts: u32,

    /// Number of history entries fetched on start. The live list keeps at
    /// most [`DEFAULT_HISTORY_CAPACITY`] of them.
    pub history_limit: usize,
}

impl TrackingConfig {
    /// Time since the last successful save after which the heartbeat
    /// re-sends the current position. Saturates instead of overflowing.
    pub fn heartbeat_stale_after(&self) -> Duration {
        self.heartbeat_interval.saturating_mul(HEARTBEAT_STALE_FACTOR)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
            initial_options: PositionOptions::INITIAL,
            watch_options: PositionOptions::WATCH,
            render_retry_interval: DEFAULT_RETRY_INTERVAL,
            max_render_attempts: DEFAULT_MAX_RENDER_ATTEMPTS,
            history_limit: DEFAULT_HISTORY_CAPACITY,
        }
    }
}
