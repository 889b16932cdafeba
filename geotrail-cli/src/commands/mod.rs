//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, list, init)
//! - [`health`] - Server reachability check
//! - [`history`] - Recently saved locations
//! - [`track`] - Main command (run the tracking service)

pub mod config;
pub mod health;
pub mod history;
pub mod track;
