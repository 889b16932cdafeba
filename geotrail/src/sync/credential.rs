//! Bearer credential supply.
//!
//! Issuing and verifying tokens is the backend's business; the client only
//! needs something that hands it the current token.

/// Environment variable that overrides the configured token.
pub const TOKEN_ENV_VAR: &str = "GEOTRAIL_TOKEN";

/// Source of the bearer token sent with authenticated requests.
pub trait CredentialProvider: Send + Sync {
    /// The current token, or `None` when logged out.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StaticCredential {
    /// Wrap a token. Empty strings count as no token.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.trim().is_empty()).then_some(token),
        }
    }

    /// No token at all.
    pub fn none() -> Self {
        Self { token: None }
    }

    /// Use `GEOTRAIL_TOKEN` if set and non-empty, otherwise `fallback`.
    pub fn from_env_or(fallback: Option<String>) -> Self {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.trim().is_empty() => Self::new(token),
            _ => fallback.map(Self::new).unwrap_or_default(),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}
