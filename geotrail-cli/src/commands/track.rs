//! Track command - run the tracking service until interrupted.
//!
//! Positions come from a replayed JSON-lines track; without one the sensor
//! is reported as unavailable. Map updates go to the log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geotrail::sync::{HttpLocationSync, LocationSync};
use geotrail::time::{Clock, SystemClock};
use geotrail::tracking::{
    spawn_connectivity_monitor, spawn_status_logger, GeolocationError, LogRenderer, MapRenderer,
    NoOpRenderer, PositionOptions, PositionSource, ReplaySource, SampleSink, TrackingHandle,
    TrackingNotice, TrackingService, TrackingStatus, WatchHandle, DEFAULT_HEALTH_CHECK_INTERVAL,
    DEFAULT_STATUS_LOG_INTERVAL,
};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the track command.
#[derive(Debug, Default)]
pub struct TrackArgs {
    pub replay: Option<PathBuf>,
    pub interval_ms: u64,
    pub start_delay_ms: u64,
    pub duration_secs: Option<u64>,
    pub debug: bool,
}

/// Why the command stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Interrupted,
    DurationElapsed,
    TrackingStopped,
}

/// Run the track command.
pub fn run(args: TrackArgs) -> Result<(), CliError> {
    let runner = CliRunner::with_logging(args.debug)?;
    runner.log_startup("track");

    let sync = Arc::new(runner.create_sync()?);
    runner.block_on(track(&runner, args, sync))?
}

async fn track(
    runner: &CliRunner,
    args: TrackArgs,
    sync: Arc<HttpLocationSync>,
) -> Result<(), CliError> {
    let config = runner.config();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let source: Arc<dyn PositionSource> = match &args.replay {
        Some(path) => {
            let replay = ReplaySource::load(
                path,
                Duration::from_millis(args.interval_ms.max(1)),
                clock.clone(),
            )?;
            println!("Replaying {} fixes from {}", replay.len(), path.display());
            Arc::new(replay)
        }
        None => Arc::new(NoSensor),
    };

    let renderer: Arc<dyn MapRenderer> = if config.map.enabled {
        Arc::new(LogRenderer::new())
    } else {
        Arc::new(NoOpRenderer)
    };

    let (service, handle) = TrackingService::builder(source, renderer, sync.clone())
        .config(config.tracking_config())
        .clock(clock)
        .build();
    let service_task = service.start();

    let cancellation = CancellationToken::new();
    let printer = spawn_notice_printer(handle.subscribe(), cancellation.clone());
    let logger = tracing::enabled!(tracing::Level::DEBUG).then(|| {
        spawn_status_logger(
            handle.clone(),
            cancellation.clone(),
            DEFAULT_STATUS_LOG_INTERVAL,
        )
    });

    let monitor = watch_server(
        &handle,
        sync,
        cancellation.clone(),
        DEFAULT_HEALTH_CHECK_INTERVAL,
    )
    .await?;

    let reason = match start_after_delay(&handle, Duration::from_millis(args.start_delay_ms)).await
    {
        Ok(Some(reason)) => reason,
        Ok(None) => wait_for_exit(&handle, args.duration_secs.map(Duration::from_secs)).await,
        Err(e) => {
            shutdown(&handle, &cancellation).await;
            return Err(e);
        }
    };

    info!(?reason, "Stopping tracking");
    let status = handle.status();
    shutdown(&handle, &cancellation).await;

    let _ = service_task.await;
    let _ = printer.await;
    let _ = monitor.await;
    if let Some(logger) = logger {
        let _ = logger.await;
    }

    print_summary(&status);
    Ok(())
}

/// Check the server before tracking; an unreachable server is not fatal.
async fn check_server(sync: &impl LocationSync) -> bool {
    match sync.check_health().await {
        Ok(health) if health.is_ok() => {
            info!("Location server is reachable");
            true
        }
        Ok(health) => {
            warn!(status = %health.status, "Location server reported a problem");
            println!("Warning: server reported status '{}'", health.status);
            false
        }
        Err(e) => {
            warn!(error = %e, "Location server not reachable");
            println!(
                "Warning: server not reachable. Tracking will work but data won't be saved \
                 until it comes back."
            );
            false
        }
    }
}

/// Check the server once, then keep watching it.
///
/// Saving is paused while the server is unreachable and resumes when a
/// later check succeeds.
async fn watch_server<S: LocationSync + 'static>(
    handle: &TrackingHandle,
    sync: Arc<S>,
    cancellation: CancellationToken,
    interval: Duration,
) -> Result<tokio::task::JoinHandle<()>, CliError> {
    let online = check_server(sync.as_ref()).await;
    if !online {
        handle.set_online(false).await?;
    }
    Ok(spawn_connectivity_monitor(
        handle.clone(),
        sync,
        cancellation,
        interval,
        online,
    ))
}

/// Wait out the start delay, then start tracking.
///
/// Returns `Some(reason)` when interrupted before tracking began.
async fn start_after_delay(
    handle: &TrackingHandle,
    delay: Duration,
) -> Result<Option<ExitReason>, CliError> {
    if !delay.is_zero() {
        println!("Starting in {} ms (Ctrl-C to cancel)", delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => return Ok(Some(ExitReason::Interrupted)),
        }
    }

    handle.start().await?;
    println!("Tracking started. Press Ctrl-C to stop.");
    Ok(None)
}

async fn wait_for_exit(handle: &TrackingHandle, duration: Option<Duration>) -> ExitReason {
    let mut status = handle.status_receiver();

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            ExitReason::Interrupted
        }
        _ = deadline => ExitReason::DurationElapsed,
        _ = status.wait_for(|s| !s.state.is_active()) => ExitReason::TrackingStopped,
    }
}

async fn shutdown(handle: &TrackingHandle, cancellation: &CancellationToken) {
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Tracking service already stopped");
    }
    cancellation.cancel();
}

fn spawn_notice_printer(
    mut notices: broadcast::Receiver<TrackingNotice>,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Ok(notice) => println!("{}", describe(&notice)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Notice printer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = cancellation.cancelled() => break,
            }
        }
    })
}

/// One-line text for a notice.
fn describe(notice: &TrackingNotice) -> String {
    match notice {
        TrackingNotice::Started => "● Online - Tracking".to_string(),
        TrackingNotice::Stopped => "○ Offline - Not Tracking".to_string(),
        TrackingNotice::PermissionDenied { message } => format!("✗ {}", message),
        TrackingNotice::SensorError { message, .. } => format!("! {}", message),
        TrackingNotice::MapDegraded { message } => format!("! {}", message),
        TrackingNotice::ConnectivityLost { message } => format!("! {}", message),
        TrackingNotice::ConnectivityRestored => "✓ Connection restored".to_string(),
    }
}

fn print_summary(status: &TrackingStatus) {
    println!();
    println!("Session Summary");
    println!("===============");
    println!("  Locations saved: {}", status.locations_saved);
    match &status.last_sample {
        Some(sample) => println!(
            "  Last position:   {} (±{})",
            sample.display_coords(),
            sample.display_accuracy()
        ),
        None => println!("  Last position:   (none)"),
    }
    if status.map_degraded {
        println!("  Map:             fallback display");
    }
}

/// Position source for hosts without a sensor.
struct NoSensor;

impl PositionSource for NoSensor {
    fn is_available(&self) -> bool {
        false
    }

    fn current_position(&self, _options: &PositionOptions, sink: SampleSink) {
        sink.deliver(Err(GeolocationError::unavailable()));
    }

    fn watch_position(
        &self,
        _options: &PositionOptions,
        _sink: SampleSink,
    ) -> Result<WatchHandle, GeolocationError> {
        Err(GeolocationError::unavailable())
    }

    fn clear_watch(&self, _handle: WatchHandle) {}
}
