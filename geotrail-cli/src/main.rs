//! GeoTrail CLI - Command-line interface
//!
//! Runs the tracking service against a replayed track and manages the
//! local configuration.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::history::HistoryArgs;
use commands::track::TrackArgs;

#[derive(Parser)]
#[command(name = "geotrail")]
#[command(version = geotrail::VERSION)]
#[command(about = "Track a device position and save it to a location server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track positions and save significant moves to the server
    Track {
        /// JSON-lines file of fixes to replay as the position sensor
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,

        /// Interval between replayed fixes in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Delay before tracking starts in milliseconds
        #[arg(long, default_value = "1000")]
        start_delay_ms: u64,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Show recently saved locations
    History {
        /// Number of locations to fetch (default: from config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check whether the location server is reachable
    Health,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Track {
            replay,
            interval_ms,
            start_delay_ms,
            duration_secs,
            debug,
        } => commands::track::run(TrackArgs {
            replay,
            interval_ms,
            start_delay_ms,
            duration_secs,
            debug,
        }),
        Commands::History { limit } => commands::history::run(HistoryArgs { limit }),
        Commands::Health => commands::health::run(),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
