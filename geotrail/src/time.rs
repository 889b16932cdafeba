//! Wall-clock access and human-readable time formatting.
//!
//! Components that compare timestamps (the heartbeat staleness check, the
//! history "time ago" labels) read the current time through [`Clock`] so that
//! tests can substitute a [`ManualClock`].

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that follows the tokio timer.
///
/// Anchored to the wall clock when created and advanced by
/// `tokio::time::Instant`, so it moves with a paused runtime in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor at `anchor`.
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        self.anchor + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero())
    }
}

/// Clock that only moves when told to.
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use geotrail::time::{Clock, ManualClock};
///
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
/// clock.advance(Duration::seconds(10));
/// assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 10).unwrap());
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format a timestamp as a local `HH:MM:SS` time of day.
pub fn format_time_of_day(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string()
}

/// Format how long ago `then` was, relative to `now`.
///
/// Under a minute reports seconds, under an hour minutes, under a day hours.
/// Anything older falls back to the absolute time of day. Timestamps in the
/// future are clamped to "0 seconds ago".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - then).num_seconds().max(0);

    if diff < 60 {
        format!("{} seconds ago", diff)
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format_time_of_day(then)
    }
}
