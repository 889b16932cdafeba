//! Integration tests for the tracking service.
//!
//! These tests drive the full stack (service loop, controller, tokio timers,
//! spawned sync tasks) on a paused tokio clock:
//! - Distance-gated persistence for a realistic walk
//! - Heartbeat re-saves of a stale position, also with a silent sensor
//! - Map render retries running out
//! - Out-of-order acknowledgments
//! - Stop/start leaving no live watch or timer behind
//! - Permission-denied and timeout handling
//! - Saving resumes once an unreachable server comes back
//!
//! Run with: `cargo test --test tracking_integration`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geotrail::geo::{haversine_distance, Coordinate, DistanceFilter};
use geotrail::sync::{HealthResponse, LocationSync, PersistAck, SyncError};
use geotrail::time::{Clock, TokioClock};
use geotrail::tracking::{
    spawn_connectivity_monitor, GeolocationError, HistoryEntry, HistoryView, MapRenderer,
    NoOpRenderer, PositionOptions, PositionSample, PositionSource, RenderError, ReplayRecord,
    ReplaySource, SampleSink, TrackingHandle, TrackingNotice, TrackingService, TrackingState,
    TrackingStatus, WatchHandle,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Doubles
// ============================================================================

/// Source that exposes the sinks it was handed so tests can push fixes.
#[derive(Default)]
struct ScriptedSource {
    sinks: Mutex<Vec<SampleSink>>,
    cleared: AtomicUsize,
}

impl ScriptedSource {
    fn latest_sink(&self) -> SampleSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("watch should be registered")
    }
}

impl PositionSource for ScriptedSource {
    fn is_available(&self) -> bool {
        true
    }

    fn current_position(&self, _options: &PositionOptions, _sink: SampleSink) {}

    fn watch_position(
        &self,
        _options: &PositionOptions,
        sink: SampleSink,
    ) -> Result<WatchHandle, GeolocationError> {
        let id = sink.watch_id();
        self.sinks.lock().unwrap().push(sink);
        Ok(WatchHandle::new(id))
    }

    fn clear_watch(&self, _handle: WatchHandle) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sync that records persist calls and can delay individual acks.
///
/// Health checks follow `health` until it runs out, then report ok.
#[derive(Default)]
struct RecordingSync {
    calls: Mutex<Vec<PositionSample>>,
    delays: Mutex<VecDeque<Duration>>,
    health: Mutex<VecDeque<bool>>,
}

impl RecordingSync {
    fn with_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: Mutex::new(delays.into_iter().collect()),
            ..Self::default()
        }
    }

    fn with_health(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            health: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<PositionSample> {
        self.calls.lock().unwrap().clone()
    }
}

impl LocationSync for RecordingSync {
    async fn persist(&self, sample: &PositionSample) -> Result<PersistAck, SyncError> {
        self.calls.lock().unwrap().push(sample.clone());
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(PersistAck {
            id: None,
            recorded_at: None,
        })
    }

    async fn fetch_history(&self, _limit: usize) -> Result<Vec<HistoryEntry>, SyncError> {
        Err(SyncError::Http("history unavailable".into()))
    }

    async fn check_health(&self) -> Result<HealthResponse, SyncError> {
        let up = self.health.lock().unwrap().pop_front().unwrap_or(true);
        if !up {
            return Err(SyncError::Http("connection refused".into()));
        }
        Ok(HealthResponse {
            status: "ok".into(),
            timestamp: None,
        })
    }
}

/// Map that never comes up.
#[derive(Default)]
struct BrokenMap {
    reinits: AtomicUsize,
    fallbacks: AtomicUsize,
}

impl MapRenderer for BrokenMap {
    fn update(&self, _lat: f64, _lon: f64, _acc: f64) -> Result<(), RenderError> {
        Err(RenderError::NotReady)
    }

    fn reinitialize(&self) -> Result<(), RenderError> {
        self.reinits.fetch_add(1, Ordering::SeqCst);
        Err(RenderError::Failed("tiles unavailable".into()))
    }

    fn show_fallback(&self, _lat: f64, _lon: f64) -> Result<(), RenderError> {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

struct Running {
    handle: TrackingHandle,
    clock: Arc<TokioClock>,
}

fn spawn(
    source: Arc<dyn PositionSource>,
    renderer: Arc<dyn MapRenderer>,
    sync: Arc<RecordingSync>,
) -> Running {
    let clock = Arc::new(TokioClock::new());
    let (service, handle) = TrackingService::builder(source, renderer, sync)
        .clock(clock.clone())
        .build();
    service.start();
    Running { handle, clock }
}

impl Running {
    fn sample(&self, latitude: f64, longitude: f64) -> PositionSample {
        PositionSample::new(latitude, longitude, 5.0, self.clock.now())
    }

    async fn wait_for(&self, what: impl FnMut(&TrackingStatus) -> bool) {
        let mut status = self.handle.status_receiver();
        tokio::time::timeout(Duration::from_secs(120), status.wait_for(what))
            .await
            .expect("condition not reached in time")
            .expect("service stopped");
    }
}

/// Let spawned tasks run without advancing much virtual time.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Distance filter properties
// ============================================================================

#[test]
fn test_distance_is_symmetric_and_non_negative() {
    let points = [
        Coordinate::new(10.0, 10.0),
        Coordinate::new(-33.9, 151.2),
        Coordinate::new(89.9, -179.9),
        Coordinate::new(0.0, 0.0),
    ];

    for a in &points {
        assert_eq!(haversine_distance(a, a), 0.0);
        for b in &points {
            let ab = haversine_distance(a, b);
            assert!(ab >= 0.0);
            assert!((ab - haversine_distance(b, a)).abs() < 1e-6);
        }
    }
}

#[test]
fn test_first_sample_is_always_significant() {
    let filter = DistanceFilter::default();
    assert!(filter.is_significant(None, &Coordinate::new(10.0, 10.0)));
}

#[test]
fn test_history_keeps_most_recent_twenty() {
    let base = chrono::Utc::now();
    let mut view = HistoryView::default();

    for i in 0..25 {
        view.add_entry(HistoryEntry {
            latitude: i as f64 * 0.01,
            longitude: 0.0,
            accuracy_meters: 5.0,
            recorded_at: base + chrono::Duration::seconds(i),
        });
    }

    let secs: Vec<i64> = view
        .entries()
        .map(|e| (e.recorded_at - base).num_seconds())
        .collect();
    assert_eq!(secs, (5..25).rev().collect::<Vec<_>>());
}

// ============================================================================
// Service scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_walk_persists_only_significant_moves() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    app.handle.start().await.unwrap();

    let sink = source.latest_sink();
    let walk = [(10.0, 10.0), (10.00003, 10.00003), (10.0010, 10.0010)];
    for (lat, lon) in walk {
        sink.deliver(Ok(app.sample(lat, lon)));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    app.wait_for(|s| s.locations_saved == 2).await;

    let persisted: Vec<(f64, f64)> = sync
        .calls()
        .iter()
        .map(|s| (s.latitude, s.longitude))
        .collect();
    assert_eq!(persisted, vec![(10.0, 10.0), (10.0010, 10.0010)]);

    let status = app.handle.status();
    assert_eq!(status.last_sample.unwrap().latitude, 10.0010);
    assert_eq!(status.history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_resaves_stationary_position() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    app.handle.start().await.unwrap();

    let sink = source.latest_sink();
    sink.deliver(Ok(app.sample(53.55, 9.99)));
    app.wait_for(|s| s.locations_saved == 1).await;

    // Jitter well under the distance threshold, one fix per second
    for i in 1..=8 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        sink.deliver(Ok(app.sample(53.55 + (i % 2) as f64 * 0.00001, 9.99)));
    }
    settle().await;
    assert_eq!(sync.calls().len(), 1, "not stale before 3 heartbeats");

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        sink.deliver(Ok(app.sample(53.55, 9.99)));
    }
    app.wait_for(|s| s.locations_saved == 2).await;

    let calls = sync.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].captured_at > calls[0].captured_at);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_keeps_saving_when_sensor_goes_silent() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    app.handle.start().await.unwrap();

    let only = app.sample(48.14, 11.58);
    source.latest_sink().deliver(Ok(only.clone()));
    app.wait_for(|s| s.locations_saved == 1).await;

    // Stale after 9 s without a save, checked every 3 s: saves at 0, 12, 24, 36, 48
    tokio::time::sleep(Duration::from_millis(59_500)).await;

    let calls = sync.calls();
    assert_eq!(calls.len(), 5);
    assert!(calls.iter().all(|c| *c == only));
    assert_eq!(app.handle.status().locations_saved, 5);
}

#[tokio::test(start_paused = true)]
async fn test_map_retries_stop_after_three_failures() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let map = Arc::new(BrokenMap::default());
    let app = spawn(source.clone(), map.clone(), sync.clone());
    let mut notices = app.handle.subscribe();
    app.handle.start().await.unwrap();

    source.latest_sink().deliver(Ok(app.sample(48.85, 2.35)));
    app.wait_for(|s| s.map_degraded).await;

    // Leave plenty of time for any rogue retry timer
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(map.reinits.load(Ordering::SeqCst), 2);
    assert_eq!(map.fallbacks.load(Ordering::SeqCst), 1);

    let status = app.handle.status();
    assert_eq!(status.render_failures, 3);
    assert_eq!(status.state, TrackingState::Tracking);
    assert_eq!(status.locations_saved, 1);

    let mut degraded = 0;
    while let Ok(notice) = notices.try_recv() {
        if matches!(notice, TrackingNotice::MapDegraded { .. }) {
            degraded += 1;
        }
    }
    assert_eq!(degraded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_acks_keep_newest_persisted() {
    let source = Arc::new(ScriptedSource::default());
    // First persist is slow, second is fast
    let sync = Arc::new(RecordingSync::with_delays([
        Duration::from_secs(5),
        Duration::from_millis(100),
    ]));
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    app.handle.start().await.unwrap();

    let sink = source.latest_sink();
    let older = app.sample(40.0, -3.7);
    sink.deliver(Ok(older.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let newer = app.sample(40.01, -3.7);
    sink.deliver(Ok(newer.clone()));

    app.wait_for(|s| s.locations_saved == 2).await;

    let status = app.handle.status();
    assert_eq!(status.last_persisted, Some(newer.clone()));
    assert_eq!(status.history[0].recorded_at, newer.captured_at);
    assert_eq!(status.history[1].recorded_at, older.captured_at);
}

#[tokio::test(start_paused = true)]
async fn test_stop_leaves_no_live_watch_or_timer() {
    let track: Vec<ReplayRecord> = (0..200)
        .map(|i| ReplayRecord::Fix {
            latitude: 50.0 + i as f64 * 0.001,
            longitude: 8.0,
            accuracy: Some(6.0),
        })
        .collect();

    let clock = Arc::new(TokioClock::new());
    let source = Arc::new(ReplaySource::new(track, Duration::from_secs(1), clock.clone()));
    let sync = Arc::new(RecordingSync::default());
    let (service, handle) = TrackingService::builder(source, Arc::new(NoOpRenderer), sync.clone())
        .clock(clock)
        .build();
    service.start();

    handle.start().await.unwrap();
    let mut status = handle.status_receiver();
    status.wait_for(|s| s.locations_saved >= 3).await.unwrap();

    handle.stop().await.unwrap();
    settle().await;
    let calls_at_stop = sync.calls().len();
    let snapshot = handle.status();
    assert_eq!(snapshot.state, TrackingState::Stopped);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sync.calls().len(), calls_at_stop);
    assert_eq!(handle.status().last_sample, snapshot.last_sample);

    // Deliveries resume only after another start
    handle.start().await.unwrap();
    status
        .wait_for(|s| s.locations_saved as usize >= calls_at_stop + 2)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_stops_and_timeout_does_not() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    let mut notices = app.handle.subscribe();
    app.handle.start().await.unwrap();

    source
        .latest_sink()
        .deliver(Err(GeolocationError::permission_denied()));
    app.wait_for(|s| s.state == TrackingState::Stopped).await;
    assert_eq!(source.cleared.load(Ordering::SeqCst), 1);

    let mut saw_denied = false;
    while let Ok(notice) = notices.try_recv() {
        saw_denied |= matches!(notice, TrackingNotice::PermissionDenied { .. });
    }
    assert!(saw_denied);

    // Heartbeat is gone with the session: nothing fires while stopped
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(sync.calls().is_empty());

    app.handle.start().await.unwrap();
    source.latest_sink().deliver(Err(GeolocationError::timeout()));
    settle().await;

    assert_eq!(app.handle.status().state, TrackingState::Tracking);
    assert!(matches!(
        notices.try_recv(),
        Ok(TrackingNotice::Started)
    ));
    assert!(matches!(
        notices.try_recv(),
        Ok(TrackingNotice::SensorError { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_offline_then_online_saves_latest_position() {
    let source = Arc::new(ScriptedSource::default());
    let sync = Arc::new(RecordingSync::default());
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());
    app.handle.start().await.unwrap();
    app.handle.set_online(false).await.unwrap();

    let sink = source.latest_sink();
    sink.deliver(Ok(app.sample(35.68, 139.76)));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let latest = app.sample(35.69, 139.76);
    sink.deliver(Ok(latest.clone()));
    settle().await;

    assert!(sync.calls().is_empty());
    assert!(app.handle.status().sync_degraded);

    app.handle.set_online(true).await.unwrap();
    app.wait_for(|s| s.locations_saved == 1).await;
    assert_eq!(sync.calls(), vec![latest]);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_server_at_start_resumes_saving() {
    let source = Arc::new(ScriptedSource::default());
    // Down for the startup check and the first poll
    let sync = Arc::new(RecordingSync::with_health([false, false]));
    let app = spawn(source.clone(), Arc::new(NoOpRenderer), sync.clone());

    let online = sync.check_health().await.is_ok();
    assert!(!online);
    app.handle.set_online(false).await.unwrap();
    let cancel = CancellationToken::new();
    let monitor = spawn_connectivity_monitor(
        app.handle.clone(),
        sync.clone(),
        cancel.clone(),
        Duration::from_secs(10),
        online,
    );
    app.handle.start().await.unwrap();

    // 0.001 deg of latitude is about 111 m
    let sink = source.latest_sink();
    for i in 0..5 {
        sink.deliver(Ok(app.sample(51.50 + i as f64 * 0.001, -0.12)));
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    assert!(sync.calls().is_empty());
    assert!(app.handle.status().sync_degraded);

    app.wait_for(|s| !s.sync_degraded && s.locations_saved >= 1).await;
    let last = app.handle.status().last_sample.unwrap();
    assert_eq!(sync.calls()[0], last);

    sink.deliver(Ok(app.sample(51.51, -0.12)));
    app.wait_for(|s| s.locations_saved >= 2).await;

    cancel.cancel();
    monitor.await.unwrap();
}
