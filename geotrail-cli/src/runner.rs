//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and the async
//! runtime so command handlers stay small.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use geotrail::config::ConfigFile;
use geotrail::logging::{default_log_file, init_logging, LoggingGuard};
use geotrail::sync::HttpLocationSync;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: Option<LoggingGuard>,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Load config without installing a log subscriber.
    ///
    /// Used by short one-shot commands that only print to the terminal.
    pub fn quiet() -> Result<Self, CliError> {
        Ok(Self {
            logging_guard: None,
            config: ConfigFile::load()?,
        })
    }

    /// Load config and initialize file logging, mirrored to stdout.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    pub fn with_logging(debug_mode: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let (log_dir, log_file) = split_log_path(&config.logging.file);

        let logging_guard = init_logging(&log_dir, &log_file, true, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard: Some(logging_guard),
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("GeoTrail v{}", geotrail::VERSION);
        info!("GeoTrail CLI: {} command", command);
    }

    /// Create the HTTP client for the configured server.
    pub fn create_sync(&self) -> Result<HttpLocationSync, CliError> {
        let credential = Arc::new(self.config.credential());
        HttpLocationSync::new(self.config.sync_config(), credential).map_err(CliError::Sync)
    }

    /// Run a future to completion on a fresh multi-threaded runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, CliError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;
        Ok(runtime.block_on(future))
    }
}

/// Split the configured log path into directory and file name.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| default_log_file().to_string());
    (dir, file)
}
