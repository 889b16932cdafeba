//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::Ini;
use url::Url;

use super::defaults::MAX_HISTORY_LIMIT;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("base_url") {
            let v = v.trim();
            if Url::parse(v).is_err() {
                return Err(invalid(
                    "server",
                    "base_url",
                    v,
                    "must be an absolute URL like 'https://tracker.example.com'",
                ));
            }
            config.server.base_url = v.to_string();
        }
        if let Some(v) = section.get("token") {
            let v = v.trim();
            if !v.is_empty() {
                config.server.token = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("timeout") {
            config.server.timeout =
                parse_positive(v, "server", "timeout", "must be a positive integer (seconds)")?;
        }
    }

    // [tracking] section
    if let Some(section) = ini.section(Some("tracking")) {
        if let Some(v) = section.get("heartbeat_interval_ms") {
            config.tracking.heartbeat_interval_ms = parse_positive(
                v,
                "tracking",
                "heartbeat_interval_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("min_distance_meters") {
            let parsed: f64 = parse_value(
                v,
                "tracking",
                "min_distance_meters",
                "must be a non-negative number",
            )?;
            if !parsed.is_finite() || parsed < 0.0 {
                return Err(invalid(
                    "tracking",
                    "min_distance_meters",
                    v,
                    "must be a non-negative number",
                ));
            }
            config.tracking.min_distance_meters = parsed;
        }
        if let Some(v) = section.get("high_accuracy") {
            config.tracking.high_accuracy = parse_bool(v);
        }
        if let Some(v) = section.get("initial_timeout_ms") {
            config.tracking.initial_timeout_ms = parse_positive(
                v,
                "tracking",
                "initial_timeout_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("watch_timeout_ms") {
            config.tracking.watch_timeout_ms = parse_positive(
                v,
                "tracking",
                "watch_timeout_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("max_cache_age_ms") {
            config.tracking.max_cache_age_ms = parse_value(
                v,
                "tracking",
                "max_cache_age_ms",
                "must be a non-negative integer (milliseconds)",
            )?;
        }
    }

    // [map] section
    if let Some(section) = ini.section(Some("map")) {
        if let Some(v) = section.get("enabled") {
            config.map.enabled = parse_bool(v);
        }
        if let Some(v) = section.get("retry_interval_ms") {
            config.map.retry_interval_ms = parse_positive(
                v,
                "map",
                "retry_interval_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("max_attempts") {
            config.map.max_attempts =
                parse_positive(v, "map", "max_attempts", "must be a positive integer")?;
        }
    }

    // [history] section
    if let Some(section) = ini.section(Some("history")) {
        if let Some(v) = section.get("limit") {
            let limit: usize =
                parse_positive(v, "history", "limit", "must be between 1 and 100")?;
            if limit > MAX_HISTORY_LIMIT {
                return Err(invalid("history", "limit", v, "must be between 1 and 100"));
            }
            config.history.limit = limit;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: FromStr>(
    value: &str,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

/// Parse an integer that must be greater than zero.
fn parse_positive<T>(
    value: &str,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_value(value, section, key, reason)?;
    if parsed <= T::default() {
        return Err(invalid(section, key, value, reason));
    }
    Ok(parsed)
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
