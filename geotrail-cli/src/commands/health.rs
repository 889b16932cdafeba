//! Health command - check that the location server answers.

use geotrail::sync::LocationSync;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the health command.
pub fn run() -> Result<(), CliError> {
    let runner = CliRunner::quiet()?;
    let sync = runner.create_sync()?;

    println!("Checking {} ...", sync.base_url());

    let health = runner.block_on(sync.check_health())??;
    if !health.is_ok() {
        return Err(CliError::ServerUnhealthy(health.status));
    }

    match health.timestamp {
        Some(ts) => println!("✓ Server is healthy (server time {})", ts.to_rfc3339()),
        None => println!("✓ Server is healthy"),
    }
    Ok(())
}
