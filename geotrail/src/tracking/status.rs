//! Published snapshot of controller state.

use chrono::{DateTime, Utc};

use super::history::{HistoryEntry, HistoryRow, HistoryView};
use super::sample::PositionSample;
use super::session::TrackingState;

/// Point-in-time view of the controller, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingStatus {
    pub state: TrackingState,

    /// Most recent fix.
    pub last_sample: Option<PositionSample>,

    /// Most recent server-acknowledged fix.
    pub last_persisted: Option<PositionSample>,

    /// Successful persists since the controller was created.
    pub locations_saved: u64,

    /// Network is down; samples are not being saved.
    pub sync_degraded: bool,

    /// Map rendering gave up and the fallback display is shown.
    pub map_degraded: bool,

    /// Consecutive render failures.
    pub render_failures: u32,

    /// History entries, newest first.
    pub history: Vec<HistoryEntry>,
}

impl TrackingStatus {
    /// Status line: `"Online - Tracking"` or `"Offline - Not Tracking"`.
    pub fn display_status(&self) -> &'static str {
        if self.state.is_active() {
            "Online - Tracking"
        } else {
            "Offline - Not Tracking"
        }
    }

    /// History rendered relative to `now`.
    pub fn history_rows(&self, now: DateTime<Utc>) -> Vec<HistoryRow> {
        let mut view = HistoryView::new(self.history.len().max(1));
        view.seed(self.history.iter().cloned());
        view.render(now)
    }
}
