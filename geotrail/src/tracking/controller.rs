//! Tracking controller: the session state machine.
//!
//! # States
//!
//! ```text
//! Stopped --start()--> Starting --watch registered / first callback--> Tracking
//! Tracking --stop() / PermissionDenied--> Stopped
//! ```
//!
//! # Per-sample pipeline
//!
//! 1. Record `last_sample`
//! 2. Decide persistence against `last_persisted` (distance filter)
//! 3. Render through the [`RetryCoordinator`]; independent of step 2
//! 4. Dispatch the persist; the ack comes back as an event
//!
//! The controller is driven by [`handle_event`](TrackingController::handle_event)
//! and never blocks. Network calls run on spawned tasks that report back
//! through the event queue.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::config::TrackingConfig;
use super::error::TrackingError;
use super::event::{EventSender, TrackingEvent, TrackingNotice};
use super::history::{HistoryEntry, HistoryView, DEFAULT_HISTORY_CAPACITY};
use super::renderer::MapRenderer;
use super::retry::{RenderOutcome, RetryCoordinator, RetryState};
use super::sample::{GeolocationError, PositionSample};
use super::scheduler::{Scheduler, TimerId, TokioScheduler};
use super::session::{TrackingSession, TrackingState};
use super::source::{PositionSource, SampleSink, WatchId};
use super::status::TrackingStatus;
use crate::geo::DistanceFilter;
use crate::sync::{LocationSync, PersistAck, SyncError};
use crate::time::{Clock, SystemClock};

/// Capacity of the notice broadcast channel.
const NOTICE_CHANNEL_CAPACITY: usize = 64;

const MAP_DEGRADED_MESSAGE: &str = "Map failed to update. Showing location without map.";
const OFFLINE_MESSAGE: &str =
    "Internet connection lost. Location tracking continues but data is not being saved to the server.";

/// Owns one tracking session at a time and reacts to its events.
pub struct TrackingController<S: LocationSync + 'static> {
    config: TrackingConfig,
    source: Arc<dyn PositionSource>,
    renderer: Arc<dyn MapRenderer>,
    sync: Arc<S>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    filter: DistanceFilter,
    retry: RetryCoordinator,
    events: EventSender,

    session: TrackingSession,
    session_counter: u64,
    history: HistoryView,
    locations_saved: u64,
    sync_degraded: bool,
    map_degraded: bool,

    notices: broadcast::Sender<TrackingNotice>,
    status: watch::Sender<TrackingStatus>,
}

impl<S: LocationSync + 'static> TrackingController<S> {
    /// Create a stopped controller.
    ///
    /// Timers default to [`TokioScheduler`] delivering into `events`, and
    /// time to the system clock.
    pub fn new(
        config: TrackingConfig,
        source: Arc<dyn PositionSource>,
        renderer: Arc<dyn MapRenderer>,
        sync: Arc<S>,
        events: EventSender,
    ) -> Self {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new(events.clone()));
        let retry = RetryCoordinator::with_limits(
            Arc::clone(&renderer),
            Arc::clone(&scheduler),
            config.max_render_attempts,
            config.render_retry_interval,
        );
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(TrackingStatus::default());

        Self {
            filter: DistanceFilter::new(config.min_distance_meters),
            history: HistoryView::new(config.history_limit.min(DEFAULT_HISTORY_CAPACITY)),
            config,
            source,
            renderer,
            sync,
            scheduler,
            clock: Arc::new(SystemClock),
            retry,
            events,
            session: TrackingSession::default(),
            session_counter: 0,
            locations_saved: 0,
            sync_degraded: false,
            map_degraded: false,
            notices,
            status,
        }
    }

    /// Use a different timer scheduler.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.retry = RetryCoordinator::with_limits(
            Arc::clone(&self.renderer),
            Arc::clone(&scheduler),
            self.config.max_render_attempts,
            self.config.render_retry_interval,
        );
        self.scheduler = scheduler;
        self
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> TrackingState {
        self.session.state
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn history(&self) -> &HistoryView {
        &self.history
    }

    pub fn retry_state(&self) -> &RetryState {
        self.retry.state()
    }

    pub fn locations_saved(&self) -> u64 {
        self.locations_saved
    }

    pub fn is_sync_degraded(&self) -> bool {
        self.sync_degraded
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Subscribe to user-visible notices.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackingNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<TrackingNotice> {
        self.notices.clone()
    }

    /// Receiver for status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<TrackingStatus> {
        self.status.subscribe()
    }

    /// Current status snapshot.
    pub fn status(&self) -> TrackingStatus {
        TrackingStatus {
            state: self.session.state,
            last_sample: self.session.last_sample.clone(),
            last_persisted: self.session.last_persisted.clone(),
            locations_saved: self.locations_saved,
            sync_degraded: self.sync_degraded,
            map_degraded: self.map_degraded,
            render_failures: self.retry.state().attempt_count,
            history: self.history.entries().cloned().collect(),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Start a tracking session.
    ///
    /// Requests a one-shot initial fix, registers the continuous watch,
    /// starts the heartbeat and fetches history. Does nothing if a session
    /// is already running.
    pub fn start(&mut self) -> Result<(), TrackingError> {
        if self.session.is_active() {
            tracing::debug!("Tracking already active");
            return Ok(());
        }

        if !self.source.is_available() {
            tracing::warn!("Geolocation is not supported on this device");
            return Err(TrackingError::CapabilityUnavailable);
        }

        self.session_counter += 1;
        let mut session = TrackingSession::starting(self.session_counter);
        let sink = SampleSink::new(session.watch_id(), self.events.clone());

        tracing::info!(session = session.id, "Starting location tracking");

        self.source
            .current_position(&self.config.initial_options, sink.clone());

        // On failure the half-built session is dropped here; a one-shot fix
        // already requested arrives tagged with an id that is never current.
        let watch = self
            .source
            .watch_position(&self.config.watch_options, sink)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to start location watch");
                TrackingError::Watch(e)
            })?;

        session.watch = Some(watch);
        session.state = TrackingState::Tracking;
        session.heartbeat = Some(
            self.scheduler
                .schedule_repeating(self.config.heartbeat_interval),
        );

        self.session = session;
        self.retry.reset();
        self.map_degraded = false;

        self.request_history();
        self.notify(TrackingNotice::Started);
        self.publish_status();

        tracing::info!(
            session = self.session.id,
            heartbeat_ms = self.config.heartbeat_interval.as_millis() as u64,
            "Location tracking started"
        );
        Ok(())
    }

    /// Stop the current session. No-op when already stopped.
    pub fn stop(&mut self) {
        if !self.session.is_active() {
            return;
        }

        let mut session = std::mem::take(&mut self.session);
        if let Some(watch) = session.watch.take() {
            self.source.clear_watch(watch);
        }
        self.retry.cancel_timer();

        tracing::info!(
            session = session.id,
            pending_persists = session.in_flight.len(),
            "Location tracking stopped"
        );
        drop(session);

        self.notify(TrackingNotice::Stopped);
        self.publish_status();
    }

    /// React to the page/app becoming visible or hidden.
    ///
    /// When visible with a session that lost its watch, tracking restarts.
    pub fn on_visibility_changed(&mut self, visible: bool) {
        if !visible {
            tracing::debug!("App hidden");
            return;
        }

        if self.session.is_active() && self.session.watch.is_none() {
            tracing::info!("Restarting tracking after becoming visible");
            self.stop();
            if let Err(e) = self.start() {
                tracing::warn!(error = %e, "Failed to restart tracking");
            }
        }
    }

    /// React to network connectivity changes.
    pub fn on_connectivity_changed(&mut self, online: bool) {
        if online == !self.sync_degraded {
            return;
        }

        if online {
            self.sync_degraded = false;
            tracing::info!("Internet connection restored");
            self.notify(TrackingNotice::ConnectivityRestored);

            if self.session.is_active() {
                if let Some(sample) = self.session.last_sample.clone() {
                    self.persist(sample, "reconnect");
                }
            }
        } else {
            self.sync_degraded = true;
            tracing::warn!("Internet connection lost, positions will not be saved");
            self.notify(TrackingNotice::ConnectivityLost {
                message: OFFLINE_MESSAGE.to_string(),
            });
        }

        self.publish_status();
    }

    /// Re-centre the map on a history entry (0 is newest).
    pub fn show_history_entry(&self, index: usize) -> Result<HistoryEntry, TrackingError> {
        let entry = self
            .history
            .get(index)
            .cloned()
            .ok_or(TrackingError::NoSuchHistoryEntry(index))?;

        self.renderer
            .update(entry.latitude, entry.longitude, entry.accuracy_meters)?;
        Ok(entry)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Handle one asynchronous event to completion.
    pub fn handle_event(&mut self, event: TrackingEvent) {
        match event {
            TrackingEvent::Position { watch, result } => {
                if !self.is_current(watch) {
                    tracing::trace!(%watch, "Dropping delivery for stale watch");
                    return;
                }
                match result {
                    Ok(sample) => self.on_sample(sample),
                    Err(e) => self.on_position_error(e),
                }
            }
            TrackingEvent::WatchLost { watch } => {
                if self.is_current(watch) {
                    tracing::warn!(%watch, "Position source ended the watch");
                    self.session.watch = None;
                }
            }
            TrackingEvent::TimerFired(id) => self.on_timer(id),
            TrackingEvent::PersistCompleted {
                session,
                sample,
                result,
            } => self.on_persist_completed(session, sample, result),
            TrackingEvent::HistoryLoaded(result) => self.on_history_loaded(result),
        }

        self.publish_status();
    }

    fn is_current(&self, watch: WatchId) -> bool {
        self.session.is_active() && watch == self.session.watch_id()
    }

    fn on_sample(&mut self, sample: PositionSample) {
        if self.session.state == TrackingState::Starting {
            self.session.state = TrackingState::Tracking;
        }
        self.session.error_streak = None;

        let previous = self
            .session
            .last_persisted
            .as_ref()
            .map(PositionSample::coordinate);
        let should_persist = self
            .filter
            .is_significant(previous.as_ref(), &sample.coordinate());

        tracing::debug!(
            lat = format!("{:.6}", sample.latitude),
            lon = format!("{:.6}", sample.longitude),
            accuracy_m = sample.accuracy_meters,
            should_persist,
            "Position sample"
        );

        self.session.last_sample = Some(sample.clone());

        let outcome = self.retry.submit_render(&sample);
        self.on_render_outcome(outcome);

        if should_persist {
            self.persist(sample, "distance");
        }
    }

    fn on_position_error(&mut self, error: GeolocationError) {
        let kind = error.kind;

        if kind.is_fatal() {
            tracing::warn!(error = %error, "Location permission denied, stopping");
            self.notify(TrackingNotice::PermissionDenied {
                message: kind.user_message().to_string(),
            });
            self.stop();
            return;
        }

        if self.session.state == TrackingState::Starting {
            self.session.state = TrackingState::Tracking;
        }

        tracing::warn!(kind = %kind, message = %error.message, "Geolocation error");

        if self.session.error_streak != Some(kind) {
            self.session.error_streak = Some(kind);
            self.notify(TrackingNotice::SensorError {
                kind,
                message: kind.user_message().to_string(),
            });
        }
    }

    fn on_timer(&mut self, id: TimerId) {
        let is_heartbeat = self
            .session
            .heartbeat
            .as_ref()
            .is_some_and(|h| h.id() == id);

        if is_heartbeat {
            self.on_heartbeat();
            return;
        }

        match self.retry.on_timer(id, self.session.last_sample.as_ref()) {
            Some(outcome) => self.on_render_outcome(outcome),
            None => tracing::trace!(timer = id.0, "Ignoring stale timer"),
        }
    }

    /// Re-send the current position when nothing has been saved for a while.
    ///
    /// Staleness is measured from the last successful save, so a sensor
    /// that goes quiet still gets its last fix saved again every few ticks.
    fn on_heartbeat(&mut self) {
        let (Some(last), Some(saved_at)) =
            (&self.session.last_sample, self.session.last_saved_at)
        else {
            return;
        };

        let age = self.clock.now() - saved_at;
        let stale = age
            .to_std()
            .is_ok_and(|age| age > self.config.heartbeat_stale_after());

        if !stale {
            return;
        }
        if self.session.is_pending(last) {
            tracing::trace!("Heartbeat save already in flight");
            return;
        }

        tracing::debug!(
            age_secs = age.num_seconds(),
            "Last save is stale, re-sending position"
        );
        let sample = last.clone();
        self.send_persist(sample, "heartbeat");
    }

    fn on_render_outcome(&mut self, outcome: RenderOutcome) {
        match outcome {
            RenderOutcome::Rendered => {
                if self.map_degraded {
                    tracing::info!("Map display recovered");
                    self.map_degraded = false;
                }
            }
            RenderOutcome::Exhausted => {
                self.map_degraded = true;
                self.notify(TrackingNotice::MapDegraded {
                    message: MAP_DEGRADED_MESSAGE.to_string(),
                });
            }
            RenderOutcome::RetryScheduled { .. }
            | RenderOutcome::RetryPending { .. }
            | RenderOutcome::Degraded => {}
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    fn persist(&mut self, sample: PositionSample, reason: &'static str) {
        if self.session.is_persisted_or_pending(&sample) {
            tracing::trace!(reason, "Position already saved or in flight");
            return;
        }

        self.send_persist(sample, reason);
    }

    /// Spawn the save without the already-saved check.
    fn send_persist(&mut self, sample: PositionSample, reason: &'static str) {
        if self.sync_degraded {
            tracing::debug!(reason, "Offline, not saving position");
            return;
        }

        self.session.in_flight.insert(sample.captured_at);

        let sync = Arc::clone(&self.sync);
        let events = self.events.clone();
        let session = self.session.id;

        tracing::debug!(reason, session, "Saving position");

        tokio::spawn(async move {
            let result = sync.persist(&sample).await;
            let _ = events.send(TrackingEvent::PersistCompleted {
                session,
                sample,
                result,
            });
        });
    }

    fn on_persist_completed(
        &mut self,
        session: u64,
        sample: PositionSample,
        result: Result<PersistAck, SyncError>,
    ) {
        let current = session == self.session.id && self.session.is_active();

        match result {
            Ok(ack) => {
                self.locations_saved += 1;
                if current {
                    self.session.record_ack(&sample);
                    self.session.last_saved_at = Some(self.clock.now());
                }
                self.history
                    .add_entry(HistoryEntry::from_sample(&sample, ack.recorded_at));

                tracing::info!(
                    lat = format!("{:.6}", sample.latitude),
                    lon = format!("{:.6}", sample.longitude),
                    saved = self.locations_saved,
                    "Location saved"
                );
            }
            Err(e) => {
                if current {
                    self.session.in_flight.remove(&sample.captured_at);
                }
                tracing::warn!(error = %e, "Failed to save location");
            }
        }
    }

    fn request_history(&self) {
        let sync = Arc::clone(&self.sync);
        let events = self.events.clone();
        let limit = self.config.history_limit;

        tokio::spawn(async move {
            let result = sync.fetch_history(limit).await;
            let _ = events.send(TrackingEvent::HistoryLoaded(result));
        });
    }

    fn on_history_loaded(&mut self, result: Result<Vec<HistoryEntry>, SyncError>) {
        match result {
            Ok(entries) => {
                tracing::debug!(count = entries.len(), "Location history loaded");
                self.history.seed(entries);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to load location history"),
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn notify(&self, notice: TrackingNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn publish_status(&self) {
        self.status.send_replace(self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::HealthResponse;
    use crate::tracking::event::{event_channel, EventReceiver};
    use crate::tracking::renderer::RenderError;
    use crate::tracking::sample::{GeolocationErrorKind, PositionOptions};
    use crate::tracking::scheduler::ManualScheduler;
    use crate::tracking::source::WatchHandle;
    use crate::time::ManualClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    // -------------------------------------------------------------------------
    // Doubles
    // -------------------------------------------------------------------------

    struct MockSource {
        available: bool,
        watch_error: Option<GeolocationError>,
        next_watch: AtomicUsize,
        one_shots: Mutex<Vec<PositionOptions>>,
        watches: Mutex<Vec<PositionOptions>>,
        cleared: AtomicUsize,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                available: true,
                watch_error: None,
                next_watch: AtomicUsize::new(0),
                one_shots: Mutex::new(Vec::new()),
                watches: Mutex::new(Vec::new()),
                cleared: AtomicUsize::new(0),
            }
        }
    }

    impl PositionSource for MockSource {
        fn is_available(&self) -> bool {
            self.available
        }

        fn current_position(&self, options: &PositionOptions, _sink: SampleSink) {
            self.one_shots.lock().unwrap().push(*options);
        }

        fn watch_position(
            &self,
            options: &PositionOptions,
            sink: SampleSink,
        ) -> Result<WatchHandle, GeolocationError> {
            if let Some(e) = &self.watch_error {
                return Err(e.clone());
            }
            self.next_watch.fetch_add(1, Ordering::SeqCst);
            self.watches.lock().unwrap().push(*options);
            Ok(WatchHandle::new(sink.watch_id()))
        }

        fn clear_watch(&self, _handle: WatchHandle) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockSync {
        persisted: Mutex<Vec<PositionSample>>,
        failing: AtomicBool,
        history: Mutex<Vec<HistoryEntry>>,
        requested_limit: AtomicUsize,
    }

    impl MockSync {
        fn persisted(&self) -> Vec<PositionSample> {
            self.persisted.lock().unwrap().clone()
        }
    }

    impl LocationSync for MockSync {
        async fn persist(&self, sample: &PositionSample) -> Result<PersistAck, SyncError> {
            self.persisted.lock().unwrap().push(sample.clone());
            if self.failing.load(Ordering::SeqCst) {
                Err(SyncError::Http("connection refused".into()))
            } else {
                Ok(PersistAck {
                    id: None,
                    recorded_at: None,
                })
            }
        }

        async fn fetch_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, SyncError> {
            self.requested_limit.store(limit, Ordering::SeqCst);
            Ok(self.history.lock().unwrap().clone())
        }

        async fn check_health(&self) -> Result<HealthResponse, SyncError> {
            Ok(HealthResponse {
                status: "ok".into(),
                timestamp: None,
            })
        }
    }

    #[derive(Default)]
    struct TestRenderer {
        broken: AtomicBool,
        updates: AtomicUsize,
        fallbacks: AtomicUsize,
    }

    impl MapRenderer for TestRenderer {
        fn update(&self, _lat: f64, _lon: f64, _acc: f64) -> Result<(), RenderError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                Err(RenderError::NotReady)
            } else {
                Ok(())
            }
        }

        fn reinitialize(&self) -> Result<(), RenderError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(RenderError::Failed("still broken".into()))
            } else {
                Ok(())
            }
        }

        fn show_fallback(&self, _lat: f64, _lon: f64) -> Result<(), RenderError> {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // Harness
    // -------------------------------------------------------------------------

    struct Harness {
        controller: TrackingController<MockSync>,
        events: EventReceiver,
        scheduler: Arc<ManualScheduler>,
        clock: Arc<ManualClock>,
        source: Arc<MockSource>,
        sync: Arc<MockSync>,
        renderer: Arc<TestRenderer>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    impl Harness {
        fn new() -> Self {
            Self::with_source(MockSource::new())
        }

        fn with_source(source: MockSource) -> Self {
            Self::build(source, TrackingConfig::default())
        }

        fn with_config(config: TrackingConfig) -> Self {
            Self::build(MockSource::new(), config)
        }

        fn build(source: MockSource, config: TrackingConfig) -> Self {
            let (tx, rx) = event_channel();
            let scheduler = Arc::new(ManualScheduler::new());
            let clock = Arc::new(ManualClock::new(t0()));
            let source = Arc::new(source);
            let sync = Arc::new(MockSync::default());
            let renderer = Arc::new(TestRenderer::default());

            let controller = TrackingController::new(
                config,
                source.clone(),
                renderer.clone(),
                sync.clone(),
                tx,
            )
            .with_scheduler(scheduler.clone())
            .with_clock(clock.clone());

            Self {
                controller,
                events: rx,
                scheduler,
                clock,
                source,
                sync,
                renderer,
            }
        }

        /// Deliver a fix stamped with the current clock time.
        fn deliver(&mut self, latitude: f64, longitude: f64) -> PositionSample {
            let sample = PositionSample::new(latitude, longitude, 5.0, self.clock.now());
            let watch = self.controller.session().watch_id();
            self.controller.handle_event(TrackingEvent::Position {
                watch,
                result: Ok(sample.clone()),
            });
            sample
        }

        fn deliver_error(&mut self, error: GeolocationError) {
            let watch = self.controller.session().watch_id();
            self.controller.handle_event(TrackingEvent::Position {
                watch,
                result: Err(error),
            });
        }

        fn heartbeat_id(&self) -> TimerId {
            self.controller
                .session()
                .heartbeat
                .as_ref()
                .map(|h| h.id())
                .expect("heartbeat should be running")
        }

        fn fire_heartbeat(&mut self) {
            let id = self.heartbeat_id();
            self.controller.handle_event(TrackingEvent::TimerFired(id));
        }

        /// Let spawned sync tasks finish and feed their events back.
        async fn settle(&mut self) {
            for _ in 0..5 {
                tokio::task::yield_now().await;
                while let Ok(event) = self.events.try_recv() {
                    self.controller.handle_event(event);
                }
            }
        }

        fn advance(&self, secs: i64) {
            self.clock.advance(Duration::seconds(secs));
        }
    }

    fn drain(rx: &mut broadcast::Receiver<TrackingNotice>) -> Vec<TrackingNotice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    // ~4.4 m of latitude
    const SMALL_STEP: f64 = 0.00004;
    // ~156 m of latitude
    const LARGE_STEP: f64 = 0.0014;

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_without_capability_stays_stopped() {
        let mut source = MockSource::new();
        source.available = false;
        let mut h = Harness::with_source(source);

        assert_eq!(
            h.controller.start(),
            Err(TrackingError::CapabilityUnavailable)
        );
        assert_eq!(h.controller.state(), TrackingState::Stopped);
        assert_eq!(h.scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_releases_everything() {
        let mut source = MockSource::new();
        source.watch_error = Some(GeolocationError::unavailable());
        let mut h = Harness::with_source(source);

        assert!(matches!(h.controller.start(), Err(TrackingError::Watch(_))));
        assert_eq!(h.controller.state(), TrackingState::Stopped);
        assert!(h.scheduler.active().is_empty());
        assert!(h.controller.session().watch.is_none());
    }

    #[tokio::test]
    async fn test_start_registers_watch_heartbeat_and_one_shot() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();

        h.controller.start().unwrap();

        assert_eq!(h.controller.state(), TrackingState::Tracking);
        assert_eq!(
            h.scheduler.active_with_period(StdDuration::from_secs(3)).len(),
            1
        );
        assert_eq!(
            *h.source.one_shots.lock().unwrap(),
            vec![PositionOptions::INITIAL]
        );
        assert_eq!(
            *h.source.watches.lock().unwrap(),
            vec![PositionOptions::WATCH]
        );
        assert_eq!(drain(&mut notices), vec![TrackingNotice::Started]);

        // Starting twice does nothing
        h.controller.start().unwrap();
        assert_eq!(h.source.next_watch.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_everything() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();
        h.controller.start().unwrap();

        h.renderer.broken.store(true, Ordering::SeqCst);
        h.deliver(10.0, 10.0);
        assert_eq!(h.scheduler.active().len(), 2);

        h.controller.stop();
        h.controller.stop();

        assert_eq!(h.controller.state(), TrackingState::Stopped);
        assert!(h.scheduler.active().is_empty());
        assert_eq!(h.source.cleared.load(Ordering::SeqCst), 1);

        let stopped = drain(&mut notices)
            .into_iter()
            .filter(|n| *n == TrackingNotice::Stopped)
            .count();
        assert_eq!(stopped, 1);
    }

    #[tokio::test]
    async fn test_deliveries_after_stop_are_dropped() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let old_watch = h.controller.session().watch_id();
        h.controller.stop();

        h.controller.handle_event(TrackingEvent::Position {
            watch: old_watch,
            result: Ok(PositionSample::new(1.0, 1.0, 5.0, t0())),
        });
        h.settle().await;

        assert!(h.controller.session().last_sample.is_none());
        assert!(h.sync.persisted().is_empty());
    }

    // -------------------------------------------------------------------------
    // Persistence decisions
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_distance_filter_gates_persistence() {
        let mut h = Harness::new();
        h.controller.start().unwrap();

        let first = h.deliver(53.0, 10.0);
        h.settle().await;
        assert_eq!(h.controller.session().last_persisted, Some(first.clone()));

        h.advance(1);
        h.deliver(53.0 + SMALL_STEP, 10.0);
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 1);

        h.advance(1);
        let far = h.deliver(53.0 + LARGE_STEP, 10.0);
        h.settle().await;

        assert_eq!(h.sync.persisted(), vec![first, far.clone()]);
        assert_eq!(h.controller.session().last_persisted, Some(far));
        assert_eq!(h.controller.locations_saved(), 2);
        assert_eq!(h.controller.history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_persist_does_not_advance_last_persisted() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        h.sync.failing.store(true, Ordering::SeqCst);

        h.deliver(53.0, 10.0);
        h.settle().await;
        assert!(h.controller.session().last_persisted.is_none());
        assert!(h.controller.session().in_flight.is_empty());

        // Nothing persisted yet, so the next fix is eligible again
        h.advance(1);
        h.deliver(53.0, 10.0);
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 2);
        assert_eq!(h.controller.locations_saved(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_acks_keep_newest() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let session = h.controller.session().id;

        let older = PositionSample::new(1.0, 1.0, 5.0, t0());
        let newer = PositionSample::new(2.0, 2.0, 5.0, t0() + Duration::seconds(5));
        let ack = || {
            Ok(PersistAck {
                id: None,
                recorded_at: None,
            })
        };

        h.controller.handle_event(TrackingEvent::PersistCompleted {
            session,
            sample: newer.clone(),
            result: ack(),
        });
        h.controller.handle_event(TrackingEvent::PersistCompleted {
            session,
            sample: older.clone(),
            result: ack(),
        });

        assert_eq!(h.controller.session().last_persisted, Some(newer.clone()));
        let history: Vec<_> = h.controller.history().entries().cloned().collect();
        assert_eq!(history[0].recorded_at, newer.captured_at);
        assert_eq!(history[1].recorded_at, older.captured_at);
    }

    #[tokio::test]
    async fn test_late_ack_after_stop_counts_but_leaves_session_alone() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let old_session = h.controller.session().id;
        h.controller.stop();

        h.controller.handle_event(TrackingEvent::PersistCompleted {
            session: old_session,
            sample: PositionSample::new(1.0, 1.0, 5.0, t0()),
            result: Ok(PersistAck {
                id: Some("x".into()),
                recorded_at: None,
            }),
        });

        assert_eq!(h.controller.locations_saved(), 1);
        assert_eq!(h.controller.history().len(), 1);
        assert!(h.controller.session().last_persisted.is_none());
    }

    // -------------------------------------------------------------------------
    // Heartbeat
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_heartbeat_persists_stale_position_once() {
        let mut h = Harness::new();
        h.controller.start().unwrap();

        h.deliver(53.0, 10.0);
        h.settle().await;

        // Small moves are not persisted by distance
        h.advance(10);
        let latest = h.deliver(53.0 + SMALL_STEP, 10.0);
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 1);

        // 10 s > 3 x 3 s: heartbeat forces a persist; a second tick while
        // the first is in flight does not duplicate it
        h.fire_heartbeat();
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 2);
        assert_eq!(h.controller.session().last_persisted, Some(latest));

        // Freshly persisted: no further heartbeat persists
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_resends_last_fix_when_sensor_is_quiet() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let only = h.deliver(53.0, 10.0);
        h.settle().await;

        h.advance(10);
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted(), vec![only.clone(), only.clone()]);

        // Measured from the re-save, not from when the fix was taken
        h.advance(5);
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 2);

        h.advance(5);
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 3);
        assert_eq!(h.controller.locations_saved(), 3);
    }

    #[tokio::test]
    async fn test_heartbeat_respects_threshold() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        h.deliver(53.0, 10.0);
        h.settle().await;

        h.advance(9);
        h.deliver(53.0 + SMALL_STEP, 10.0);
        h.fire_heartbeat();
        h.settle().await;
        // Exactly 3 x interval is not stale
        assert_eq!(h.sync.persisted().len(), 1);

        h.advance(1);
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_without_persisted_sample_does_nothing() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        h.sync.failing.store(true, Ordering::SeqCst);
        h.deliver(53.0, 10.0);
        h.settle().await;

        h.advance(60);
        h.fire_heartbeat();
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_timer_is_ignored() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let old_heartbeat = h.heartbeat_id();
        h.deliver(53.0, 10.0);
        h.settle().await;
        h.controller.stop();
        h.controller.start().unwrap();

        h.advance(60);
        h.controller
            .handle_event(TrackingEvent::TimerFired(old_heartbeat));
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 1);
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_permission_denied_stops_tracking() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();
        h.controller.start().unwrap();

        h.deliver_error(GeolocationError::permission_denied());

        assert_eq!(h.controller.state(), TrackingState::Stopped);
        assert!(h.scheduler.active().is_empty());

        let notices = drain(&mut notices);
        assert!(notices
            .iter()
            .any(|n| matches!(n, TrackingNotice::PermissionDenied { .. })));
        assert_eq!(notices.last(), Some(&TrackingNotice::Stopped));
    }

    #[tokio::test]
    async fn test_sensor_errors_notify_once_per_streak() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();
        h.controller.start().unwrap();
        drain(&mut notices);

        h.deliver_error(GeolocationError::timeout());
        h.deliver_error(GeolocationError::timeout());
        assert_eq!(
            drain(&mut notices),
            vec![TrackingNotice::SensorError {
                kind: GeolocationErrorKind::Timeout,
                message: GeolocationErrorKind::Timeout.user_message().to_string(),
            }]
        );
        assert_eq!(h.controller.state(), TrackingState::Tracking);

        h.deliver_error(GeolocationError::unavailable());
        assert_eq!(drain(&mut notices).len(), 1);

        h.deliver(53.0, 10.0);
        h.deliver_error(GeolocationError::unavailable());
        assert_eq!(drain(&mut notices).len(), 1);
    }

    // -------------------------------------------------------------------------
    // Map
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_render_failures_degrade_once_and_persistence_continues() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();
        h.controller.start().unwrap();
        h.renderer.broken.store(true, Ordering::SeqCst);

        h.deliver(53.0, 10.0);
        let retry_timer = h
            .controller
            .retry_state()
            .timer_id()
            .expect("retry timer should be scheduled");

        h.controller
            .handle_event(TrackingEvent::TimerFired(retry_timer));
        h.controller
            .handle_event(TrackingEvent::TimerFired(retry_timer));

        assert!(h.controller.retry_state().is_exhausted());
        assert!(h.controller.status().map_degraded);
        assert_eq!(h.renderer.fallbacks.load(Ordering::SeqCst), 1);

        for i in 1..=4 {
            h.advance(1);
            h.deliver(53.0 + LARGE_STEP * i as f64, 10.0);
        }
        h.settle().await;

        let degraded = drain(&mut notices)
            .into_iter()
            .filter(|n| matches!(n, TrackingNotice::MapDegraded { .. }))
            .count();
        assert_eq!(degraded, 1);
        assert_eq!(h.sync.persisted().len(), 5);
        assert_eq!(h.controller.retry_state().attempt_count, 3);
        assert_eq!(h.scheduler.active().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_resets_render_retries() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        h.renderer.broken.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            h.deliver(53.0, 10.0);
        }
        assert!(h.controller.retry_state().is_exhausted());

        h.controller.stop();
        h.controller.start().unwrap();
        assert_eq!(h.controller.retry_state().attempt_count, 0);
        assert!(!h.controller.status().map_degraded);
    }

    #[tokio::test]
    async fn test_show_history_entry() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        h.deliver(53.0, 10.0);
        h.settle().await;

        let before = h.renderer.updates.load(Ordering::SeqCst);
        let entry = h.controller.show_history_entry(0).unwrap();
        assert_eq!(entry.latitude, 53.0);
        assert_eq!(h.renderer.updates.load(Ordering::SeqCst), before + 1);

        assert_eq!(
            h.controller.show_history_entry(5),
            Err(TrackingError::NoSuchHistoryEntry(5))
        );
    }

    // -------------------------------------------------------------------------
    // Visibility and connectivity
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_visibility_restarts_lost_watch() {
        let mut h = Harness::new();
        h.controller.start().unwrap();
        let old_watch = h.controller.session().watch_id();

        // Visible with a healthy watch: nothing happens
        h.controller.on_visibility_changed(true);
        assert_eq!(h.source.next_watch.load(Ordering::SeqCst), 1);

        h.controller
            .handle_event(TrackingEvent::WatchLost { watch: old_watch });
        assert!(h.controller.session().watch.is_none());
        assert!(h.controller.state().is_active());

        h.controller.on_visibility_changed(true);
        assert_eq!(h.source.next_watch.load(Ordering::SeqCst), 2);
        assert_ne!(h.controller.session().watch_id(), old_watch);
        assert_eq!(h.controller.state(), TrackingState::Tracking);
    }

    #[tokio::test]
    async fn test_offline_skips_persistence_and_reconnect_flushes() {
        let mut h = Harness::new();
        let mut notices = h.controller.subscribe();
        h.controller.start().unwrap();

        h.controller.on_connectivity_changed(false);
        assert!(h.controller.is_sync_degraded());

        h.deliver(53.0, 10.0);
        h.advance(1);
        let latest = h.deliver(53.0 + LARGE_STEP, 10.0);
        h.settle().await;
        assert!(h.sync.persisted().is_empty());
        assert!(h.renderer.updates.load(Ordering::SeqCst) >= 2);

        h.controller.on_connectivity_changed(true);
        h.settle().await;
        assert_eq!(h.sync.persisted(), vec![latest.clone()]);
        assert_eq!(h.controller.session().last_persisted, Some(latest));

        // Restoring twice does not persist again
        h.controller.on_connectivity_changed(true);
        h.settle().await;
        assert_eq!(h.sync.persisted().len(), 1);

        let notices = drain(&mut notices);
        assert!(notices
            .iter()
            .any(|n| matches!(n, TrackingNotice::ConnectivityLost { .. })));
        assert_eq!(
            notices
                .iter()
                .filter(|n| **n == TrackingNotice::ConnectivityRestored)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_history_seeded_on_start() {
        let mut h = Harness::new();
        *h.sync.history.lock().unwrap() = vec![
            HistoryEntry {
                latitude: 1.0,
                longitude: 1.0,
                accuracy_meters: 0.0,
                recorded_at: t0() - Duration::minutes(1),
            },
            HistoryEntry {
                latitude: 2.0,
                longitude: 2.0,
                accuracy_meters: 0.0,
                recorded_at: t0() - Duration::minutes(2),
            },
        ];

        h.controller.start().unwrap();
        h.settle().await;

        assert_eq!(h.controller.history().len(), 2);
        assert_eq!(h.controller.status().history.len(), 2);
        assert_eq!(h.controller.status_receiver().borrow().history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_list_capped_above_fetch_limit() {
        let mut h = Harness::with_config(TrackingConfig {
            history_limit: 50,
            ..TrackingConfig::default()
        });
        *h.sync.history.lock().unwrap() = (0..50)
            .map(|i| HistoryEntry {
                latitude: i as f64,
                longitude: 0.0,
                accuracy_meters: 5.0,
                recorded_at: t0() - Duration::minutes(i),
            })
            .collect();

        h.controller.start().unwrap();
        h.settle().await;

        assert_eq!(h.sync.requested_limit.load(Ordering::SeqCst), 50);
        assert_eq!(h.controller.history().len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(h.controller.history().get(0).unwrap().latitude, 0.0);
    }

    #[tokio::test]
    async fn test_smaller_history_limit_shrinks_list() {
        let mut h = Harness::with_config(TrackingConfig {
            history_limit: 5,
            ..TrackingConfig::default()
        });
        h.controller.start().unwrap();

        for i in 0..8 {
            h.advance(1);
            h.deliver(53.0 + LARGE_STEP * i as f64, 10.0);
            h.settle().await;
        }

        assert_eq!(h.sync.persisted().len(), 8);
        assert_eq!(h.controller.history().len(), 5);
    }
}
