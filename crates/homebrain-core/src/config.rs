// ── Runtime configuration ──
//
// What the sync engine needs to know about the bridge. Carries the
// auth token but never touches disk: the settings layer builds a
// `RuntimeConfig` and hands it to the `RuntimeController`.

use std::time::Duration;

use homebrain_api::{DEFAULT_REQUEST_TIMEOUT, ReconnectConfig, TransportConfig};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Floor applied to the configured poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll cadence used when the settings layer does not provide one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Lower bound of the staleness threshold.
pub const MIN_STALE_THRESHOLD: Duration = Duration::from_secs(60);

/// Configuration consumed by the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Master switch for the bridge subsystem.
    pub enabled: bool,
    /// Bridge HTTP base URL (e.g. `http://127.0.0.1:8765`).
    pub bridge_url: Url,
    /// Bearer token; `None` or blank means unauthenticated.
    pub auth_token: Option<SecretString>,
    /// Poll cadence as configured. Read through
    /// [`effective_poll_interval`](Self::effective_poll_interval).
    pub poll_interval: Duration,
    /// Per-call HTTP deadline, also bounds the WebSocket handshake.
    pub request_timeout: Duration,
    /// Event stream backoff.
    pub reconnect: ReconnectConfig,
}

impl RuntimeConfig {
    /// A disabled configuration pointing at `bridge_url` with default timings.
    pub fn new(bridge_url: Url) -> Self {
        Self {
            enabled: false,
            bridge_url,
            auth_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_auth_token(mut self, token: Option<SecretString>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Poll interval clamped to [`MIN_POLL_INTERVAL`].
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// `max(2 × poll interval, 60s)`.
    pub fn stale_threshold(&self) -> Duration {
        self.effective_poll_interval()
            .saturating_mul(2)
            .max(MIN_STALE_THRESHOLD)
    }

    /// Transport settings for a freshly built `BridgeClient`.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default()
            .with_timeout(self.request_timeout)
            .with_auth_token(self.auth_token.clone())
    }

    /// Whether switching from `self` to `other` requires tearing the
    /// runtime down and starting it again.
    pub fn requires_restart(&self, other: &Self) -> bool {
        self.enabled != other.enabled
            || self.bridge_url != other.bridge_url
            || token_text(self.auth_token.as_ref()) != token_text(other.auth_token.as_ref())
            || self.effective_poll_interval() != other.effective_poll_interval()
            || self.request_timeout != other.request_timeout
            || self.reconnect != other.reconnect
    }
}

fn token_text(token: Option<&SecretString>) -> &str {
    token.map_or("", |t| t.expose_secret().trim())
}
