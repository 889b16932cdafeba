//! User configuration stored in `~/.geotrail/config.ini`.
//!
//! # Example
//!
//! ```no_run
//! use geotrail::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let tracking = config.tracking_config();
//! assert!(tracking.heartbeat_interval.as_millis() > 0);
//! # Ok::<(), geotrail::config::ConfigFileError>(())
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use parser::parse_ini;
pub use settings::{
    ConfigFile, HistorySettings, LoggingSettings, MapSettings, ServerSettings, TrackingSettings,
};
pub use writer::to_config_string;
