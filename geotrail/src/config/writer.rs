//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub fn to_config_string(config: &ConfigFile) -> String {
    let token = config.server.token.as_deref().unwrap_or("");
    let log_file = path_to_string(&config.logging.file);

    format!(
        r#"[server]
; Base URL of the location API
base_url = {}
; Bearer token for saving and fetching locations.
; The GEOTRAIL_TOKEN environment variable takes precedence.
token = {}
; HTTP timeout in seconds (default: 10)
timeout = {}

[tracking]
; How often the heartbeat checks for a stale saved position (default: 3000)
; A position is re-saved when the last save is older than 3 heartbeats.
heartbeat_interval_ms = {}
; Movement in meters before a new position is saved (default: 5)
min_distance_meters = {}
; Request high-accuracy (GPS) fixes (default: true)
high_accuracy = {}
; Timeout for the first fix after starting (default: 15000)
initial_timeout_ms = {}
; Timeout for each continuous fix (default: 10000)
watch_timeout_ms = {}
; Maximum age of a cached fix, 0 = always fresh (default: 0)
max_cache_age_ms = {}

[map]
; Render positions on a map (default: true)
enabled = {}
; Interval between map reinitialisation attempts (default: 3000)
retry_interval_ms = {}
; Failed updates before showing the fallback display (default: 3)
max_attempts = {}

[history]
; Number of saved locations to fetch, 1-100; the live list shows at most 20 (default: 20)
limit = {}

[logging]
; Log file path (default: ~/.geotrail/geotrail.log)
file = {}
"#,
        config.server.base_url,
        token,
        config.server.timeout,
        config.tracking.heartbeat_interval_ms,
        config.tracking.min_distance_meters,
        config.tracking.high_accuracy,
        config.tracking.initial_timeout_ms,
        config.tracking.watch_timeout_ms,
        config.tracking.max_cache_age_ms,
        config.map.enabled,
        config.map.retry_interval_ms,
        config.map.max_attempts,
        config.history.limit,
        log_file,
    )
}

/// Display a path, abbreviating the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
