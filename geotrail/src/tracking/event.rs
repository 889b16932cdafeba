//! Events consumed and notices produced by the tracking controller.
//!
//! Everything that happens asynchronously (position callbacks, timer ticks,
//! network completions) is delivered to the controller as a
//! [`TrackingEvent`] on a single queue. The controller handles each event to
//! completion before taking the next, so session state never needs a lock.

use tokio::sync::mpsc;

use super::history::HistoryEntry;
use super::sample::{GeolocationError, GeolocationErrorKind, PositionSample};
use super::scheduler::TimerId;
use super::source::WatchId;
use crate::sync::{PersistAck, SyncError};

/// Sending half of the controller's event queue.
pub type EventSender = mpsc::UnboundedSender<TrackingEvent>;

/// Receiving half of the controller's event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<TrackingEvent>;

/// Create a new event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Asynchronous input to the controller.
#[derive(Debug)]
pub enum TrackingEvent {
    /// A position fix or failure from the source.
    ///
    /// Both the one-shot initial fix and the continuous watch deliver with
    /// the session's [`WatchId`]; deliveries for an older id are dropped.
    Position {
        watch: WatchId,
        result: Result<PositionSample, GeolocationError>,
    },

    /// The source ended the continuous watch on its own.
    WatchLost { watch: WatchId },

    /// A timer created through the scheduler fired.
    TimerFired(TimerId),

    /// A persist request finished.
    PersistCompleted {
        session: u64,
        sample: PositionSample,
        result: Result<PersistAck, SyncError>,
    },

    /// The history fetch issued at session start finished.
    HistoryLoaded(Result<Vec<HistoryEntry>, SyncError>),
}

/// User-visible notification emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingNotice {
    /// Tracking started.
    Started,

    /// Tracking stopped (by command or by a fatal error).
    Stopped,

    /// Location access was denied; tracking stopped.
    PermissionDenied { message: String },

    /// A transient sensor error. Reported once per streak of the same kind.
    SensorError {
        kind: GeolocationErrorKind,
        message: String,
    },

    /// The map could not be updated after the maximum number of attempts.
    MapDegraded { message: String },

    /// Network connectivity was lost; positions are not being saved.
    ConnectivityLost { message: String },

    /// Network connectivity came back.
    ConnectivityRestored,
}
