//! Periodic status logging.
//!
//! Emits one DEBUG line per interval with the current position and sync
//! counters. Useful when reviewing a tracking run from the log file.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::service::TrackingHandle;
use super::status::TrackingStatus;

/// Default logging interval.
pub const DEFAULT_STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a task that logs the tracking status every `interval`.
///
/// Stops when `cancellation` is triggered. Callers may skip spawning it when
/// DEBUG is disabled:
///
/// ```ignore
/// if tracing::enabled!(tracing::Level::DEBUG) {
///     spawn_status_logger(handle.clone(), cancel, DEFAULT_STATUS_LOG_INTERVAL);
/// }
/// ```
pub fn spawn_status_logger(
    handle: TrackingHandle,
    cancellation: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => log_status(&handle.status()),
                _ = cancellation.cancelled() => {
                    tracing::debug!("Status logger stopped");
                    break;
                }
            }
        }
    })
}

fn log_status(status: &TrackingStatus) {
    match &status.last_sample {
        Some(sample) => tracing::debug!(
            state = %status.state,
            lat = format!("{:.6}", sample.latitude),
            lon = format!("{:.6}", sample.longitude),
            accuracy_m = format!("{:.0}", sample.accuracy_meters),
            saved = status.locations_saved,
            sync_degraded = status.sync_degraded,
            map_degraded = status.map_degraded,
            "Tracking status"
        ),
        None => tracing::debug!(
            state = %status.state,
            saved = status.locations_saved,
            "Tracking status (no position yet)"
        ),
    }
}
