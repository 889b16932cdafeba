//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use geotrail::config::ConfigFileError;
use geotrail::sync::{SyncError, TOKEN_ENV_VAR};
use geotrail::tracking::{ReplayError, TrackingError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// Location server request failed
    Sync(SyncError),
    /// Location server answered but reported a problem
    ServerUnhealthy(String),
    /// Tracking service error
    Tracking(TrackingError),
    /// Replay file could not be loaded
    Replay(ReplayError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Sync(SyncError::Unauthenticated)
            | CliError::Sync(SyncError::Server { status: 401, .. }) => {
                eprintln!();
                eprintln!("Set a token with either:");
                eprintln!("  1. The {} environment variable", TOKEN_ENV_VAR);
                eprintln!("  2. server.token in config.ini ('geotrail config path' shows where)");
            }
            CliError::Sync(e) if e.is_connectivity() => {
                eprintln!();
                eprintln!("Check that the server is running and server.base_url is correct.");
            }
            CliError::Tracking(TrackingError::CapabilityUnavailable) => {
                eprintln!();
                eprintln!("No position sensor is available. Use --replay <FILE> to replay a track.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Sync(e) => write!(f, "Location server error: {}", e),
            CliError::ServerUnhealthy(status) => {
                write!(f, "Location server reported status '{}'", status)
            }
            CliError::Tracking(e) => write!(f, "Tracking error: {}", e),
            CliError::Replay(e) => write!(f, "Failed to load replay file: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Sync(e) => Some(e),
            CliError::Tracking(e) => Some(e),
            CliError::Replay(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        CliError::Sync(e)
    }
}

impl From<TrackingError> for CliError {
    fn from(e: TrackingError) -> Self {
        CliError::Tracking(e)
    }
}

impl From<ReplayError> for CliError {
    fn from(e: ReplayError) -> Self {
        CliError::Replay(e)
    }
}
