//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Backend connection settings
    pub server: ServerSettings,
    /// Position sampling and persistence settings
    pub tracking: TrackingSettings,
    /// Map renderer settings
    pub map: MapSettings,
    /// History list settings
    pub history: HistorySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Backend connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Base URL of the location API
    pub base_url: String,
    /// Bearer token (overridden by `GEOTRAIL_TOKEN`)
    pub token: Option<String>,
    /// HTTP timeout in seconds
    pub timeout: u64,
}

/// Position sampling and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Movement in meters before a fix is saved again
    pub min_distance_meters: f64,
    /// Request high-accuracy fixes
    pub high_accuracy: bool,
    /// Timeout for the initial fix in milliseconds
    pub initial_timeout_ms: u64,
    /// Timeout for each continuous fix in milliseconds
    pub watch_timeout_ms: u64,
    /// Maximum age of a cached fix in milliseconds (0 = always fresh)
    pub max_cache_age_ms: u64,
}

/// Map renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    /// Render to a map at all
    pub enabled: bool,
    /// Interval between reinitialisation attempts in milliseconds
    pub retry_interval_ms: u64,
    /// Failures before showing the fallback display
    pub max_attempts: u32,
}

/// History list.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySettings {
    /// Entries fetched and displayed
    pub limit: usize,
}

/// Logging.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
