//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use super::file::config_directory;
use super::settings::*;

// =============================================================================
// [server]
// =============================================================================

/// Default backend URL.
pub const DEFAULT_SERVER_URL: &str = crate::sync::DEFAULT_SERVER_URL;

/// Default HTTP timeout in seconds.
pub const DEFAULT_SERVER_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// [tracking]
// =============================================================================

/// Default heartbeat interval (3 seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 3_000;

/// Default minimum movement before saving again.
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = crate::geo::DEFAULT_MIN_DISTANCE_METERS;

/// Default high-accuracy request flag.
pub const DEFAULT_HIGH_ACCURACY: bool = true;

/// Default timeout for the initial fix.
pub const DEFAULT_INITIAL_TIMEOUT_MS: u64 = 15_000;

/// Default timeout for continuous fixes.
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 10_000;

/// Default maximum cached fix age.
pub const DEFAULT_MAX_CACHE_AGE_MS: u64 = 0;

// =============================================================================
// [map]
// =============================================================================

/// Map rendering is on by default.
pub const DEFAULT_MAP_ENABLED: bool = true;

/// Default interval between map reinitialisation attempts.
pub const DEFAULT_MAP_RETRY_INTERVAL_MS: u64 = 3_000;

/// Default number of render failures before falling back.
pub const DEFAULT_MAP_MAX_ATTEMPTS: u32 = 3;

// =============================================================================
// [history]
// =============================================================================

/// Default number of history entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Largest accepted history limit.
pub const MAX_HISTORY_LIMIT: usize = 100;

// =============================================================================
// [logging]
// =============================================================================

/// Default log file name inside the config directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "geotrail.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                base_url: DEFAULT_SERVER_URL.to_string(),
                token: None,
                timeout: DEFAULT_SERVER_TIMEOUT_SECS,
            },
            tracking: TrackingSettings {
                heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
                min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
                high_accuracy: DEFAULT_HIGH_ACCURACY,
                initial_timeout_ms: DEFAULT_INITIAL_TIMEOUT_MS,
                watch_timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
                max_cache_age_ms: DEFAULT_MAX_CACHE_AGE_MS,
            },
            map: MapSettings {
                enabled: DEFAULT_MAP_ENABLED,
                retry_interval_ms: DEFAULT_MAP_RETRY_INTERVAL_MS,
                max_attempts: DEFAULT_MAP_MAX_ATTEMPTS,
            },
            history: HistorySettings {
                limit: DEFAULT_HISTORY_LIMIT,
            },
            logging: LoggingSettings {
                file: config_directory().join(DEFAULT_LOG_FILE_NAME),
            },
        }
    }
}
