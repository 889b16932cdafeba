//! Location sync trait and HTTP implementation.
//!
//! The [`LocationSync`] trait is the controller's only view of the backend,
//! so tests can swap in an in-memory double. [`HttpLocationSync`] talks to
//! the REST API with `reqwest`, sending the bearer token from a
//! [`CredentialProvider`] on every authenticated request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use super::credential::CredentialProvider;
use super::error::SyncError;
use super::model::{
    ErrorResponse, HealthResponse, LocationPayload, LocationsResponse, PersistAck, PersistResponse,
    SavedLocation,
};
use crate::tracking::{HistoryEntry, PositionSample};

/// Default backend URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Default HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const LOCATION_PATH: &str = "api/location";
const LOCATIONS_PATH: &str = "api/locations";
const HEALTH_PATH: &str = "api/health";

/// Connection settings for [`HttpLocationSync`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend base URL, e.g. `https://tracker.example.com`.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Persistence boundary used by the tracking controller.
pub trait LocationSync: Send + Sync {
    /// Store one sample. Requires a credential.
    fn persist(
        &self,
        sample: &PositionSample,
    ) -> impl Future<Output = Result<PersistAck, SyncError>> + Send;

    /// Fetch up to `limit` saved locations, newest first.
    fn fetch_history(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, SyncError>> + Send;

    /// Check that the backend is reachable.
    fn check_health(&self) -> impl Future<Output = Result<HealthResponse, SyncError>> + Send;
}

/// REST client for the location backend.
pub struct HttpLocationSync {
    http: reqwest::Client,
    base_url: Url,
    credential: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpLocationSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLocationSync")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpLocationSync {
    /// Create a client.
    ///
    /// Fails if the base URL does not parse or the HTTP client cannot be
    /// built.
    pub fn new(
        config: SyncConfig,
        credential: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SyncError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            credential,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.base_url.join(path)?)
    }

    fn token(&self) -> Result<String, SyncError> {
        self.credential
            .bearer_token()
            .ok_or(SyncError::Unauthenticated)
    }

    /// Turn a non-success response into [`SyncError::Server`], using the
    /// body's `error` field when present.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(%message, "Server rejected credential");
        }

        Err(SyncError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl LocationSync for HttpLocationSync {
    async fn persist(&self, sample: &PositionSample) -> Result<PersistAck, SyncError> {
        let url = self.endpoint(LOCATION_PATH)?;
        let token = self.token()?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&LocationPayload::from(sample))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        let body: PersistResponse = serde_json::from_slice(&bytes)?;

        tracing::debug!(
            lat = sample.latitude,
            lon = sample.longitude,
            success = body.success,
            "Location persisted"
        );

        Ok(PersistAck::from(body))
    }

    async fn fetch_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, SyncError> {
        let mut url = self.endpoint(LOCATIONS_PATH)?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let token = self.token()?;

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        let body: LocationsResponse = serde_json::from_slice(&bytes)?;

        let total = body.locations.len();
        let entries: Vec<HistoryEntry> = body
            .locations
            .into_iter()
            .filter_map(SavedLocation::into_history_entry)
            .collect();

        tracing::debug!(
            total,
            usable = entries.len(),
            "Location history fetched"
        );

        Ok(entries)
    }

    async fn check_health(&self) -> Result<HealthResponse, SyncError> {
        let url = self.endpoint(HEALTH_PATH)?;

        let response = self.http.get(url).send().await?;
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}
