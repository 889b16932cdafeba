//! Error types for the location sync client.

use thiserror::Error;

/// Errors that can occur when talking to the location backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// HTTP request failed (connection refused, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Response body could not be parsed.
    #[error("Failed to parse response: {0}")]
    Json(String),

    /// The server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// No credential is available for an authenticated endpoint.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The configured base URL cannot be joined with an endpoint path.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// Whether the error suggests the server is unreachable rather than
    /// rejecting the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Json(e.to_string())
        } else {
            SyncError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Json(e.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        SyncError::InvalidUrl(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let e = SyncError::Server {
            status: 401,
            message: "Invalid token".into(),
        };
        assert_eq!(e.to_string(), "Server returned 401: Invalid token");
        assert!(!e.is_connectivity());
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(SyncError::from(err), SyncError::Json(_)));
    }
}
