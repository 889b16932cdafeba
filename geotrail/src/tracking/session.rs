//! Per-session tracking state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::sample::{GeolocationErrorKind, PositionSample};
use super::scheduler::TimerHandle;
use super::source::{WatchHandle, WatchId};

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    Stopped,
    Starting,
    Tracking,
}

impl TrackingState {
    /// Whether a session is running (starting or tracking).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Tracking => write!(f, "Tracking"),
        }
    }
}

/// State of one start..stop cycle.
///
/// A fresh value replaces this on every stop; nothing here outlives its
/// session. Dropping it releases the watch and the heartbeat timer.
#[derive(Debug, Default)]
pub struct TrackingSession {
    /// Session number, also used as the watch id for deliveries.
    pub id: u64,

    pub state: TrackingState,

    /// Continuous subscription. `None` before registration or after the
    /// source dropped it.
    pub watch: Option<WatchHandle>,

    /// Most recent fix.
    pub last_sample: Option<PositionSample>,

    /// Most recent server-acknowledged fix.
    pub last_persisted: Option<PositionSample>,

    pub heartbeat: Option<TimerHandle>,

    /// `captured_at` of samples with a persist request outstanding.
    pub in_flight: BTreeSet<DateTime<Utc>>,

    /// Clock time of the last successful save in this session.
    pub last_saved_at: Option<DateTime<Utc>>,

    /// Kind of the current sensor error streak, if any.
    pub error_streak: Option<GeolocationErrorKind>,
}

impl TrackingSession {
    /// Create a session in the `Starting` state.
    pub fn starting(id: u64) -> Self {
        Self {
            id,
            state: TrackingState::Starting,
            ..Self::default()
        }
    }

    /// The id deliveries for this session carry.
    pub fn watch_id(&self) -> WatchId {
        WatchId(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether a save of `sample` is outstanding.
    pub fn is_pending(&self, sample: &PositionSample) -> bool {
        self.in_flight.contains(&sample.captured_at)
    }

    /// Whether `sample` is already persisted or being persisted.
    pub fn is_persisted_or_pending(&self, sample: &PositionSample) -> bool {
        self.is_pending(sample)
            || self
                .last_persisted
                .as_ref()
                .is_some_and(|p| p.captured_at == sample.captured_at)
    }

    /// Record an acknowledgment. `last_persisted` never moves backwards.
    ///
    /// Returns whether `last_persisted` changed.
    pub fn record_ack(&mut self, sample: &PositionSample) -> bool {
        self.in_flight.remove(&sample.captured_at);

        let newer = self
            .last_persisted
            .as_ref()
            .map_or(true, |p| sample.captured_at >= p.captured_at);

        if newer {
            self.last_persisted = Some(sample.clone());
        }
        newer
    }
}
