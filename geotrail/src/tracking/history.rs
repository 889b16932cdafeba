//! Bounded, newest-first list of saved locations.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::PositionSample;
use crate::time::format_time_ago;

/// Maximum number of entries kept for display.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// A server-confirmed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Build an entry from an acknowledged sample.
    ///
    /// `recorded_at` is the server timestamp when one was returned.
    pub fn from_sample(sample: &PositionSample, recorded_at: Option<DateTime<Utc>>) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy_meters: sample.accuracy_meters,
            recorded_at: recorded_at.unwrap_or(sample.captured_at),
        }
    }
}

/// One rendered history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    /// `"lat, lon"` to six decimals.
    pub coords: String,
    /// Accuracy in whole meters.
    pub accuracy: String,
    /// Relative age, e.g. `"5 minutes ago"`.
    pub time_ago: String,
}

/// Display list of saved locations.
#[derive(Debug, Clone)]
pub struct HistoryView {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryView {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryView {
    /// Create an empty view holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an entry, keeping newest-first order and the capacity bound.
    ///
    /// An entry newer than everything goes to the head. An entry older than
    /// a full list is dropped immediately.
    pub fn add_entry(&mut self, entry: HistoryEntry) {
        let index = self
            .entries
            .iter()
            .position(|e| e.recorded_at <= entry.recorded_at)
            .unwrap_or(self.entries.len());

        self.entries.insert(index, entry);

        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Merge server history into the view, skipping entries already shown.
    pub fn seed(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
        for entry in entries {
            if !self.entries.contains(&entry) {
                self.add_entry(entry);
            }
        }
    }

    /// Entry at `index` (0 is newest).
    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate newest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Project the entries into display rows relative to `now`.
    pub fn render(&self, now: DateTime<Utc>) -> Vec<HistoryRow> {
        self.entries
            .iter()
            .map(|e| HistoryRow {
                coords: format!("{:.6}, {:.6}", e.latitude, e.longitude),
                accuracy: format!("{:.0} m", e.accuracy_meters),
                time_ago: format_time_ago(e.recorded_at, now),
            })
            .collect()
    }
}
