//! Timer scheduling.
//!
//! The heartbeat and the render retry both need a timer that can be
//! cancelled when tracking stops. [`Scheduler`] hands out [`TimerHandle`]s;
//! when a timer fires, a [`TrackingEvent::TimerFired`] with the handle's id is
//! pushed onto the controller's queue.
//!
//! - [`TokioScheduler`] - production implementation on `tokio::time`
//! - [`ManualScheduler`] - records requests and never fires; tests fire
//!   timers by hand

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::event::{EventSender, TrackingEvent};

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Owned timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    cancellation: CancellationToken,
}

impl TimerHandle {
    /// Create a handle with a fresh cancellation token.
    pub fn new(id: TimerId) -> Self {
        Self {
            id,
            cancellation: CancellationToken::new(),
        }
    }

    /// The timer id carried by its `TimerFired` events.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer. Idempotent.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Token observed by the task driving the timer.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Creates cancellable timers that report into the event queue.
pub trait Scheduler: Send + Sync {
    /// Fire once after `delay`.
    fn schedule_once(&self, delay: Duration) -> TimerHandle;

    /// Fire every `period`, first after one period.
    fn schedule_repeating(&self, period: Duration) -> TimerHandle;
}

/// Scheduler backed by `tokio::time`.
///
/// Each timer runs as its own task and stops when its handle is cancelled or
/// dropped, or when the event queue closes. Under a paused tokio clock the
/// timers follow virtual time.
#[derive(Debug)]
pub struct TokioScheduler {
    events: EventSender,
    next_id: AtomicU64,
}

impl TokioScheduler {
    /// Create a scheduler delivering into `events`.
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> TimerHandle {
        TimerHandle::new(TimerId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration) -> TimerHandle {
        let handle = self.allocate();
        let id = handle.id();
        let cancellation = handle.cancellation();
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(TrackingEvent::TimerFired(id));
                }
                _ = cancellation.cancelled() => {}
            }
        });

        handle
    }

    fn schedule_repeating(&self, period: Duration) -> TimerHandle {
        let handle = self.allocate();
        let id = handle.id();
        let cancellation = handle.cancellation();
        let events = self.events.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if events.send(TrackingEvent::TimerFired(id)).is_err() {
                            break;
                        }
                    }
                    _ = cancellation.cancelled() => break,
                }
            }
        });

        handle
    }
}

/// A timer request recorded by [`ManualScheduler`].
#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    /// Id of the handed-out handle.
    pub id: TimerId,
    /// Requested delay or period.
    pub period: Duration,
    /// Whether it was requested as repeating.
    pub repeating: bool,
    cancellation: CancellationToken,
}

impl ScheduledTimer {
    /// Whether the handle has been cancelled or dropped.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Scheduler that only records requests.
///
/// Nothing fires by itself; a test inspects [`ManualScheduler::active`] and
/// feeds `TrackingEvent::TimerFired(id)` to the controller when it wants a
/// timer to fire.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: AtomicU64,
    timers: Mutex<Vec<ScheduledTimer>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, period: Duration, repeating: bool) -> TimerHandle {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handle = TimerHandle::new(id);
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScheduledTimer {
                id,
                period,
                repeating,
                cancellation: handle.cancellation(),
            });
        handle
    }

    /// Every timer ever requested, in request order.
    pub fn all(&self) -> Vec<ScheduledTimer> {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Timers that have not been cancelled.
    pub fn active(&self) -> Vec<ScheduledTimer> {
        self.all()
            .into_iter()
            .filter(|t| !t.is_cancelled())
            .collect()
    }

    /// Active timers with the given period.
    pub fn active_with_period(&self, period: Duration) -> Vec<TimerId> {
        self.active()
            .into_iter()
            .filter(|t| t.period == period)
            .map(|t| t.id)
            .collect()
    }

    /// Total number of timers requested.
    pub fn scheduled_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration) -> TimerHandle {
        self.record(delay, false)
    }

    fn schedule_repeating(&self, period: Duration) -> TimerHandle {
        self.record(period, true)
    }
}
