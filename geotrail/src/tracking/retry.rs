//! Bounded retry around the map renderer.
//!
//! # State Machine
//!
//! ```text
//! Idle --[update fails]--> Retrying (attempt 1, timer scheduled)
//! Retrying --[tick: reinit + update fail]--> Retrying (attempt n+1)
//! Retrying --[attempt == max]--> Exhausted (fallback shown, timer cancelled)
//! any --[update succeeds]--> Idle (attempts reset, timer cancelled)
//! Exhausted --[reset()]--> Idle
//! ```
//!
//! The retry cadence is a fixed interval; reinitialising the map is cheap and
//! idempotent so there is nothing to gain from backing off.

use std::sync::Arc;
use std::time::Duration;

use super::renderer::{MapRenderer, RenderError};
use super::sample::PositionSample;
use super::scheduler::{Scheduler, TimerHandle, TimerId};

/// Default number of failures before giving up.
pub const DEFAULT_MAX_RENDER_ATTEMPTS: u32 = 3;

/// Default interval between reinitialisation attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Retry bookkeeping.
#[derive(Debug)]
pub struct RetryState {
    /// Consecutive failures since the last success. Never exceeds `max_attempts`.
    pub attempt_count: u32,

    /// Failures tolerated before the fallback path.
    pub max_attempts: u32,

    timer: Option<TimerHandle>,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            timer: None,
        }
    }

    /// Whether a reinitialisation timer is pending.
    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Id of the pending timer, if any.
    pub fn timer_id(&self) -> Option<TimerId> {
        self.timer.as_ref().map(TimerHandle::id)
    }

    /// Whether automatic retries have stopped.
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Result of a render attempt, for the controller to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The map shows the position.
    Rendered,

    /// The attempt failed and a retry timer was started.
    RetryScheduled { attempt: u32 },

    /// The attempt failed; a retry timer was already running.
    RetryPending { attempt: u32 },

    /// This failure hit the limit. The fallback was shown and retries stopped.
    Exhausted,

    /// Failed while already exhausted; nothing more is done.
    Degraded,
}

impl RenderOutcome {
    /// Whether the map was updated.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rendered)
    }
}

/// Drives [`MapRenderer`] with bounded, fixed-interval retries.
pub struct RetryCoordinator {
    renderer: Arc<dyn MapRenderer>,
    scheduler: Arc<dyn Scheduler>,
    retry_interval: Duration,
    state: RetryState,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("retry_interval", &self.retry_interval)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    /// Create a coordinator with the default limits.
    pub fn new(renderer: Arc<dyn MapRenderer>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_limits(
            renderer,
            scheduler,
            DEFAULT_MAX_RENDER_ATTEMPTS,
            DEFAULT_RETRY_INTERVAL,
        )
    }

    /// Create with explicit limits.
    pub fn with_limits(
        renderer: Arc<dyn MapRenderer>,
        scheduler: Arc<dyn Scheduler>,
        max_attempts: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            renderer,
            scheduler,
            retry_interval,
            state: RetryState::new(max_attempts.max(1)),
        }
    }

    /// Current retry bookkeeping.
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Push a sample to the map.
    pub fn submit_render(&mut self, sample: &PositionSample) -> RenderOutcome {
        match self
            .renderer
            .update(sample.latitude, sample.longitude, sample.accuracy_meters)
        {
            Ok(()) => self.record_success(),
            Err(e) => self.record_failure(&e, Some(sample)),
        }
    }

    /// Handle a fired timer.
    ///
    /// Returns `None` if `id` is not the pending retry timer (stale or
    /// someone else's).
    pub fn on_timer(
        &mut self,
        id: TimerId,
        current: Option<&PositionSample>,
    ) -> Option<RenderOutcome> {
        if self.state.timer_id() != Some(id) {
            return None;
        }

        tracing::debug!(
            attempt = self.state.attempt_count,
            "Attempting to reinitialise map"
        );

        if let Err(e) = self.renderer.reinitialize() {
            return Some(self.record_failure(&e, current));
        }

        let outcome = match current {
            Some(sample) => self.submit_render(sample),
            // Map is back; the next fix will draw on it
            None => self.record_success(),
        };
        Some(outcome)
    }

    /// Clear all retry state and cancel any pending timer.
    pub fn reset(&mut self) {
        self.state.attempt_count = 0;
        self.state.timer = None;
    }

    /// Cancel a pending timer without touching the attempt count.
    pub fn cancel_timer(&mut self) {
        self.state.timer = None;
    }

    fn record_success(&mut self) -> RenderOutcome {
        if self.state.attempt_count > 0 {
            tracing::info!(
                previous_failures = self.state.attempt_count,
                "Map render recovered"
            );
        }
        self.reset();
        RenderOutcome::Rendered
    }

    fn record_failure(
        &mut self,
        error: &RenderError,
        sample: Option<&PositionSample>,
    ) -> RenderOutcome {
        if self.state.is_exhausted() {
            tracing::trace!(error = %error, "Map still failing (retries exhausted)");
            return RenderOutcome::Degraded;
        }

        self.state.attempt_count += 1;
        let attempt = self.state.attempt_count;

        tracing::warn!(
            error = %error,
            attempt,
            max_attempts = self.state.max_attempts,
            "Map render failed"
        );

        if self.state.is_exhausted() {
            self.state.timer = None;
            if let Some(sample) = sample {
                if let Err(e) = self
                    .renderer
                    .show_fallback(sample.latitude, sample.longitude)
                {
                    tracing::warn!(error = %e, "Fallback display failed");
                }
            }
            return RenderOutcome::Exhausted;
        }

        if self.state.timer.is_none() {
            self.state.timer = Some(self.scheduler.schedule_repeating(self.retry_interval));
            RenderOutcome::RetryScheduled { attempt }
        } else {
            RenderOutcome::RetryPending { attempt }
        }
    }
}
