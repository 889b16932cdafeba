//! Position source abstraction.
//!
//! A [`PositionSource`] wraps whatever produces device fixes (a platform
//! geolocation API, a GPS daemon, a replay file). It delivers results into
//! the controller's event queue through a [`SampleSink`] and hands back a
//! [`WatchHandle`] that owns the continuous subscription.

use tokio_util::sync::CancellationToken;

use super::event::{EventSender, TrackingEvent};
use super::sample::{GeolocationError, PositionOptions, PositionSample};

/// Identifies one tracking session's subscription.
///
/// Every delivery carries the id it was issued for so that fixes arriving
/// after a stop (or from a previous session) can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Owned continuous subscription.
///
/// Dropping the handle cancels the subscription, so a session that is torn
/// down on any path releases its watch.
#[derive(Debug)]
pub struct WatchHandle {
    id: WatchId,
    cancellation: CancellationToken,
}

impl WatchHandle {
    /// Create a handle for a subscription delivering with `id`.
    pub fn new(id: WatchId) -> Self {
        Self {
            id,
            cancellation: CancellationToken::new(),
        }
    }

    /// The subscription id.
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Token that is cancelled when the subscription ends.
    ///
    /// Sources hand a clone to the task producing fixes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Whether the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Delivery endpoint handed to a source.
#[derive(Debug, Clone)]
pub struct SampleSink {
    watch: WatchId,
    events: EventSender,
}

impl SampleSink {
    /// Create a sink delivering into `events` tagged with `watch`.
    pub fn new(watch: WatchId, events: EventSender) -> Self {
        Self { watch, events }
    }

    /// The id deliveries are tagged with.
    pub fn watch_id(&self) -> WatchId {
        self.watch
    }

    /// Deliver a fix or failure. Returns false once the controller is gone.
    pub fn deliver(&self, result: Result<PositionSample, GeolocationError>) -> bool {
        self.events
            .send(TrackingEvent::Position {
                watch: self.watch,
                result,
            })
            .is_ok()
    }

    /// Report that the source ended the continuous watch by itself.
    pub fn watch_lost(&self) -> bool {
        self.events
            .send(TrackingEvent::WatchLost { watch: self.watch })
            .is_ok()
    }
}

/// Device geolocation capability.
///
/// Implementations must not block: fixes are delivered later through the
/// sink, typically from a spawned task.
pub trait PositionSource: Send + Sync {
    /// Whether geolocation is available at all on this device.
    fn is_available(&self) -> bool;

    /// Request a single fix, delivered once through `sink`.
    fn current_position(&self, options: &PositionOptions, sink: SampleSink);

    /// Start a continuous subscription delivering through `sink`.
    fn watch_position(
        &self,
        options: &PositionOptions,
        sink: SampleSink,
    ) -> Result<WatchHandle, GeolocationError>;

    /// End a continuous subscription.
    fn clear_watch(&self, handle: WatchHandle);
}
