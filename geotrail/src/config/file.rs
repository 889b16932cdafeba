//! Configuration file handling for ~/.geotrail/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;
use crate::sync::{StaticCredential, SyncConfig};
use crate::tracking::{PositionOptions, TrackingConfig};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.geotrail/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Runtime settings for the tracking controller.
    pub fn tracking_config(&self) -> TrackingConfig {
        let t = &self.tracking;
        TrackingConfig {
            heartbeat_interval: Duration::from_millis(t.heartbeat_interval_ms),
            min_distance_meters: t.min_distance_meters,
            initial_options: PositionOptions {
                high_accuracy: t.high_accuracy,
                timeout_ms: t.initial_timeout_ms,
                max_cache_age_ms: t.max_cache_age_ms,
            },
            watch_options: PositionOptions {
                high_accuracy: t.high_accuracy,
                timeout_ms: t.watch_timeout_ms,
                max_cache_age_ms: t.max_cache_age_ms,
            },
            render_retry_interval: Duration::from_millis(self.map.retry_interval_ms),
            max_render_attempts: self.map.max_attempts,
            history_limit: self.history.limit,
        }
    }

    /// Connection settings for the HTTP sync client.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            base_url: self.server.base_url.clone(),
            timeout: Duration::from_secs(self.server.timeout),
        }
    }

    /// Bearer credential, preferring `GEOTRAIL_TOKEN` over the file.
    pub fn credential(&self) -> StaticCredential {
        StaticCredential::from_env_or(self.server.token.clone())
    }
}

/// Get the path to the config directory (~/.geotrail).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".geotrail")
}

/// Get the path to the config file (~/.geotrail/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
