// Shared transport configuration for building reqwest::Client instances.
//
// The bridge HTTP client and the WebSocket upgrade request share the same
// timeout and bearer-token settings through this module.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

/// Default per-call deadline for bridge HTTP requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub auth_token: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_token: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The bearer token, when configured, is installed as a default
    /// `Authorization` header so every request carries it.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("homebrain/", env!("CARGO_PKG_VERSION")));

        if let Some(value) = self.bearer_header()? {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::ClientBuild(e.to_string()))
    }

    /// `Authorization: Bearer <token>` header value, if a token is set.
    ///
    /// Blank tokens are treated as absent.
    pub fn bearer_header(&self) -> Result<Option<HeaderValue>, crate::error::Error> {
        let Some(token) = self.auth_token.as_ref() else {
            return Ok(None);
        };
        let token = token.expose_secret().trim();
        if token.is_empty() {
            return Ok(None);
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| crate::error::Error::ClientBuild(format!("invalid auth token: {e}")))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }

    /// Timeout in whole milliseconds, for error reporting.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth_token(mut self, token: Option<SecretString>) -> Self {
        self.auth_token = token;
        self
    }
}
