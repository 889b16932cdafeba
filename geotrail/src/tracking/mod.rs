//! Client-side location capture and reconciliation.
//!
//! This module turns a stream of unreliable position fixes into persisted,
//! deduplicated samples while keeping a map and a history list up to date.
//!
//! # Architecture
//!
//! ```text
//! PositionSource ──SampleSink──┐
//! Scheduler (timers) ──────────┤ TrackingEvent
//! LocationSync (spawned) ──────┘
//!                               ▼
//!                     TrackingController  (owned by TrackingService)
//!                       │   ├── DistanceFilter ──> LocationSync::persist
//!                       │   ├── RetryCoordinator ──> MapRenderer
//!                       │   └── HistoryView
//!                       ▼
//!            TrackingNotice (broadcast), TrackingStatus (watch)
//! ```
//!
//! # Key Components
//!
//! - [`TrackingController`] - session state machine and per-sample pipeline
//! - [`TrackingService`] / [`TrackingHandle`] - actor loop and its client
//! - [`RetryCoordinator`] - bounded, fixed-interval map render retries
//! - [`HistoryView`] - newest-first list of saved locations, capped at 20
//! - [`ReplaySource`] - position source reading a recorded JSON-lines track
//! - [`spawn_connectivity_monitor`] - pauses and resumes saving as the server comes and goes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use geotrail::tracking::{LogRenderer, TrackingService};
//!
//! let (service, handle) = TrackingService::builder(source, Arc::new(LogRenderer::new()), sync)
//!     .build();
//! service.start();
//! handle.start().await?;
//! ```

mod config;
mod connectivity;
mod controller;
mod error;
mod event;
mod history;
mod logger;
mod renderer;
mod replay;
mod retry;
mod sample;
mod scheduler;
mod service;
mod session;
mod source;
mod status;

pub use config::{TrackingConfig, DEFAULT_HEARTBEAT_INTERVAL, HEARTBEAT_STALE_FACTOR};
pub use connectivity::{spawn_connectivity_monitor, DEFAULT_HEALTH_CHECK_INTERVAL};
pub use controller::TrackingController;
pub use error::TrackingError;
pub use event::{event_channel, EventReceiver, EventSender, TrackingEvent, TrackingNotice};
pub use history::{HistoryEntry, HistoryRow, HistoryView, DEFAULT_HISTORY_CAPACITY};
pub use logger::{spawn_status_logger, DEFAULT_STATUS_LOG_INTERVAL};
pub use renderer::{LogRenderer, MapRenderer, NoOpRenderer, RenderError};
pub use replay::{
    parse_records, ReplayError, ReplayRecord, ReplaySource, DEFAULT_REPLAY_ACCURACY_METERS,
    DEFAULT_REPLAY_INTERVAL,
};
pub use retry::{
    RenderOutcome, RetryCoordinator, RetryState, DEFAULT_MAX_RENDER_ATTEMPTS,
    DEFAULT_RETRY_INTERVAL,
};
pub use sample::{GeolocationError, GeolocationErrorKind, PositionOptions, PositionSample};
pub use scheduler::{
    ManualScheduler, ScheduledTimer, Scheduler, TimerHandle, TimerId, TokioScheduler,
};
pub use service::{Command, TrackingHandle, TrackingService, TrackingServiceBuilder};
pub use session::{TrackingSession, TrackingState};
pub use source::{PositionSource, SampleSink, WatchHandle, WatchId};
pub use status::TrackingStatus;
