//! History command - list recently saved locations.

use chrono::Utc;
use geotrail::config::MAX_HISTORY_LIMIT;
use geotrail::sync::LocationSync;
use geotrail::tracking::{HistoryRow, HistoryView};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the history command.
#[derive(Debug, Default)]
pub struct HistoryArgs {
    pub limit: Option<usize>,
}

/// Run the history command.
pub fn run(args: HistoryArgs) -> Result<(), CliError> {
    let runner = CliRunner::quiet()?;
    let limit = resolve_limit(args.limit, runner.config().history.limit)?;
    let sync = runner.create_sync()?;

    let entries = runner.block_on(sync.fetch_history(limit))??;

    let mut view = HistoryView::new(limit);
    view.seed(entries);

    let rows = view.render(Utc::now());
    if rows.is_empty() {
        println!("No locations saved yet");
        return Ok(());
    }

    println!("Recent Locations ({})", rows.len());
    println!("================");
    for line in format_rows(&rows) {
        println!("{}", line);
    }
    Ok(())
}

/// Command-line limit wins over the config value; both must be 1-100.
fn resolve_limit(arg: Option<usize>, configured: usize) -> Result<usize, CliError> {
    let limit = arg.unwrap_or(configured);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(CliError::Config(format!(
            "history limit must be between 1 and {}, got {}",
            MAX_HISTORY_LIMIT, limit
        )));
    }
    Ok(limit)
}

fn format_rows(rows: &[HistoryRow]) -> Vec<String> {
    let coords_width = rows.iter().map(|r| r.coords.len()).max().unwrap_or(0);
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            format!(
                "{:>3}. {:<width$}  ±{:<6} {}",
                i + 1,
                row.coords,
                row.accuracy,
                row.time_ago,
                width = coords_width
            )
        })
        .collect()
}
