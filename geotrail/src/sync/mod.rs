//! Client side of the location backend.
//!
//! # Endpoints
//!
//! | Method | Path | Body / Response |
//! |---|---|---|
//! | `POST` | `/api/location` | `{latitude, longitude, accuracy}` → `{success, location}` |
//! | `GET` | `/api/locations?limit=N` | → `{locations: [...]}` newest first |
//! | `GET` | `/api/health` | → `{status}` |
//!
//! Authenticated endpoints carry `Authorization: Bearer <token>`. Non-success
//! statuses carry `{error}` which becomes [`SyncError::Server`].

mod client;
mod credential;
mod error;
mod model;

pub use client::{
    HttpLocationSync, LocationSync, SyncConfig, DEFAULT_HTTP_TIMEOUT, DEFAULT_SERVER_URL,
};
pub use credential::{CredentialProvider, StaticCredential, TOKEN_ENV_VAR};
pub use error::SyncError;
pub use model::{
    ErrorResponse, HealthResponse, LocationPayload, LocationsResponse, PersistAck,
    PersistResponse, SavedLocation,
};
