//! Server reachability monitor.
//!
//! Polls [`LocationSync::check_health`] and reports changes to the tracking
//! service, so saving pauses while the server is down and resumes (with the
//! latest position) once it answers again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::service::TrackingHandle;
use crate::sync::LocationSync;

/// Default interval between health checks.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Spawn a task that checks server health every `interval`.
///
/// `initially_online` is the result of the check made before starting; the
/// first poll happens one interval later. The task ends when cancelled or
/// when the service has shut down.
pub fn spawn_connectivity_monitor<S: LocationSync + 'static>(
    handle: TrackingHandle,
    sync: Arc<S>,
    cancellation: CancellationToken,
    interval: Duration,
    initially_online: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        let mut online = initially_online;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancellation.cancelled() => {
                    tracing::debug!("Connectivity monitor stopped");
                    break;
                }
            }

            let reachable = is_reachable(sync.as_ref()).await;
            if reachable == online {
                continue;
            }

            online = reachable;
            if handle.set_online(online).await.is_err() {
                tracing::debug!("Tracking service gone, connectivity monitor exiting");
                break;
            }
        }
    })
}

async fn is_reachable(sync: &impl LocationSync) -> bool {
    match sync.check_health().await {
        Ok(health) if health.is_ok() => true,
        Ok(health) => {
            tracing::debug!(status = %health.status, "Server reported a problem");
            false
        }
        Err(e) => {
            tracing::debug!(error = %e, "Server health check failed");
            false
        }
    }
}
