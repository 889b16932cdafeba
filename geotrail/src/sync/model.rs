//! Wire types for the location API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::{HistoryEntry, PositionSample};

/// Body of `POST /api/location`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

impl From<&PositionSample> for LocationPayload {
    fn from(sample: &PositionSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy_meters,
        }
    }
}

/// A location as stored by the server.
///
/// Older records carry no accuracy; they default to zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedLocation {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SavedLocation {
    /// Convert to a history entry. Records without a timestamp are skipped.
    pub fn into_history_entry(self) -> Option<HistoryEntry> {
        let recorded_at = self.timestamp?;
        Some(HistoryEntry {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_meters: self.accuracy.unwrap_or(0.0),
            recorded_at,
        })
    }
}

/// Response of `POST /api/location`.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub location: Option<SavedLocation>,
}

/// Response of `GET /api/locations`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationsResponse {
    #[serde(default)]
    pub locations: Vec<SavedLocation>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Server acknowledgment of a persisted sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistAck {
    /// Server-assigned record id.
    pub id: Option<String>,

    /// Server-side timestamp of the record.
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<PersistResponse> for PersistAck {
    fn from(response: PersistResponse) -> Self {
        match response.location {
            Some(location) => Self {
                id: location.id,
                recorded_at: location.timestamp,
            },
            None => Self {
                id: None,
                recorded_at: None,
            },
        }
    }
}
