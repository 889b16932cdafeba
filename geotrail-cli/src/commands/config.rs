//! Configuration management CLI commands.
//!
//! Provides `config path`, `config list` and `config init` for inspecting
//! and creating `~/.geotrail/config.ini`.

use clap::Subcommand;
use geotrail::config::{config_file_path, ConfigFile};
use geotrail::sync::TOKEN_ENV_VAR;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// List the effective configuration settings
    List,

    /// Create the configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::List => run_list(),
        ConfigCommands::Init { force } => run_init(force),
    }
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// List all configuration settings.
fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = "";
    for (section, key, value) in settings(&config) {
        // Print section header when section changes
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        if value.is_empty() {
            println!("  {} = (not set)", key);
        } else {
            println!("  {} = {}", key, value);
        }
    }

    if std::env::var_os(TOKEN_ENV_VAR).is_some() {
        println!();
        println!("Note: {} is set and overrides server.token", TOKEN_ENV_VAR);
    }

    Ok(())
}

/// Write a default config file.
fn run_init(force: bool) -> Result<(), CliError> {
    let path = config_file_path();

    if path.exists() && !force {
        println!("Configuration already exists at {}", path.display());
        println!("Use 'geotrail config init --force' to overwrite it.");
        return Ok(());
    }

    ConfigFile::default().save_to(&path)?;
    println!("✓ Created {}", path.display());
    Ok(())
}

/// Flatten the config into `(section, key, value)` rows in file order.
fn settings(config: &ConfigFile) -> Vec<(&'static str, &'static str, String)> {
    let token = match &config.server.token {
        Some(_) => "********".to_string(),
        None => String::new(),
    };

    vec![
        ("server", "base_url", config.server.base_url.clone()),
        ("server", "token", token),
        ("server", "timeout", config.server.timeout.to_string()),
        (
            "tracking",
            "heartbeat_interval_ms",
            config.tracking.heartbeat_interval_ms.to_string(),
        ),
        (
            "tracking",
            "min_distance_meters",
            config.tracking.min_distance_meters.to_string(),
        ),
        (
            "tracking",
            "high_accuracy",
            config.tracking.high_accuracy.to_string(),
        ),
        (
            "tracking",
            "initial_timeout_ms",
            config.tracking.initial_timeout_ms.to_string(),
        ),
        (
            "tracking",
            "watch_timeout_ms",
            config.tracking.watch_timeout_ms.to_string(),
        ),
        (
            "tracking",
            "max_cache_age_ms",
            config.tracking.max_cache_age_ms.to_string(),
        ),
        ("map", "enabled", config.map.enabled.to_string()),
        (
            "map",
            "retry_interval_ms",
            config.map.retry_interval_ms.to_string(),
        ),
        ("map", "max_attempts", config.map.max_attempts.to_string()),
        ("history", "limit", config.history.limit.to_string()),
        (
            "logging",
            "file",
            config.logging.file.display().to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_cover_every_section_in_order() {
        let rows = settings(&ConfigFile::default());
        let mut sections: Vec<&str> = rows.iter().map(|(s, _, _)| *s).collect();
        sections.dedup();
        assert_eq!(sections, ["server", "tracking", "map", "history", "logging"]);
    }

    #[test]
    fn test_token_is_masked() {
        let mut config = ConfigFile::default();
        config.server.token = Some("secret".into());

        let rows = settings(&config);
        let (_, _, token) = rows.iter().find(|(_, k, _)| *k == "token").unwrap();
        assert_eq!(token, "********");
    }

    #[test]
    fn test_unset_token_is_empty() {
        let rows = settings(&ConfigFile::default());
        let (_, _, token) = rows.iter().find(|(_, k, _)| *k == "token").unwrap();
        assert!(token.is_empty());
    }
}
