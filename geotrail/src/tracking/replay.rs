//! Position source that replays a recorded track.
//!
//! Input is JSON lines, one record per line:
//!
//! ```text
//! {"latitude": 53.5511, "longitude": 9.9937, "accuracy": 12}
//! {"error_code": 3, "message": "Timeout expired"}
//! ```
//!
//! Fix records are stamped with the clock when delivered, not when
//! recorded. Error records use the W3C error codes (1 permission denied,
//! 2 unavailable, 3 timeout). Blank lines and lines starting with `#` are
//! skipped.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::sample::{GeolocationError, GeolocationErrorKind, PositionOptions, PositionSample};
use super::source::{PositionSource, SampleSink, WatchHandle};
use crate::time::Clock;

/// Accuracy assumed when a record has none.
pub const DEFAULT_REPLAY_ACCURACY_METERS: f64 = 10.0;

/// Default interval between replayed fixes.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(1);

/// Errors loading a replay file.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read replay file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid replay record on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// One line of a replay file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayRecord {
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy: Option<f64>,
    },
    Error {
        error_code: u16,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ReplayRecord {
    fn materialize(&self, clock: &dyn Clock) -> Result<PositionSample, GeolocationError> {
        match self {
            Self::Fix {
                latitude,
                longitude,
                accuracy,
            } => Ok(PositionSample::new(
                *latitude,
                *longitude,
                accuracy.unwrap_or(DEFAULT_REPLAY_ACCURACY_METERS),
                clock.now(),
            )),
            Self::Error {
                error_code,
                message,
            } => {
                let kind = GeolocationErrorKind::from_code(*error_code);
                Err(GeolocationError::new(
                    kind,
                    message.clone().unwrap_or_else(|| kind.to_string()),
                ))
            }
        }
    }
}

/// Parse JSON-lines replay records.
pub fn parse_records(reader: impl BufRead) -> Result<Vec<ReplayRecord>, ReplayError> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record = serde_json::from_str(trimmed).map_err(|e| ReplayError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Replays recorded fixes at a fixed interval.
pub struct ReplaySource {
    records: Arc<Vec<ReplayRecord>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl ReplaySource {
    pub fn new(records: Vec<ReplayRecord>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(records),
            interval,
            clock,
        }
    }

    /// Load a replay file.
    pub fn load(
        path: &Path,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ReplayError> {
        let file = std::fs::File::open(path)?;
        let records = parse_records(std::io::BufReader::new(file))?;
        tracing::debug!(path = %path.display(), records = records.len(), "Replay file loaded");
        Ok(Self::new(records, interval, clock))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PositionSource for ReplaySource {
    fn is_available(&self) -> bool {
        !self.records.is_empty()
    }

    fn current_position(&self, _options: &PositionOptions, sink: SampleSink) {
        if let Some(first) = self.records.first() {
            sink.deliver(first.materialize(self.clock.as_ref()));
        }
    }

    fn watch_position(
        &self,
        _options: &PositionOptions,
        sink: SampleSink,
    ) -> Result<WatchHandle, GeolocationError> {
        if self.records.is_empty() {
            return Err(GeolocationError::unavailable());
        }

        let handle = WatchHandle::new(sink.watch_id());
        let cancellation = handle.cancellation();
        let records = Arc::clone(&self.records);
        let clock = Arc::clone(&self.clock);
        let period = self.interval;

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);

            // The one-shot fix already covered the first record
            for record in records.iter().skip(1) {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !sink.deliver(record.materialize(clock.as_ref())) {
                            return;
                        }
                    }
                    _ = cancellation.cancelled() => return,
                }
            }

            tracing::info!("Replay finished");
            sink.watch_lost();
        });

        Ok(handle)
    }

    fn clear_watch(&self, handle: WatchHandle) {
        drop(handle);
    }
}
