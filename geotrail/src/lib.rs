//! GeoTrail - location tracking client core
//!
//! This library samples device position, decides which samples are worth
//! saving, pushes them to a location backend, and keeps a map and a history
//! list in step, all while the sensor, the map and the network come and go.
//!
//! # High-Level API
//!
//! The [`tracking`] module provides the service facade:
//!
//! ```ignore
//! use std::sync::Arc;
//! use geotrail::config::ConfigFile;
//! use geotrail::sync::HttpLocationSync;
//! use geotrail::tracking::{LogRenderer, TrackingService};
//!
//! let config = ConfigFile::load()?;
//! let sync = HttpLocationSync::new(config.sync_config(), Arc::new(config.credential()))?;
//!
//! let renderer = Arc::new(LogRenderer::new());
//! let (service, handle) = TrackingService::builder(source, renderer, Arc::new(sync))
//!     .config(config.tracking_config())
//!     .build();
//! service.start();
//! handle.start().await?;
//! ```

pub mod config;
pub mod geo;
pub mod logging;
pub mod sync;
pub mod time;
pub mod tracking;

/// Version of the GeoTrail library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
