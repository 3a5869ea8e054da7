// ── Core error types ──
//
// Errors surfaced by the sync engine. Consumers never see reqwest or
// tungstenite failures directly: the `From<homebrain_api::Error>` impl
// translates transport-layer errors into runtime variants.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to bridge at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Bridge rejected credentials (HTTP {status})")]
    AuthenticationFailed { status: u16 },

    #[error("Bridge request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Bridge protocol errors ───────────────────────────────────────
    #[error("Bridge protocol error: {message}")]
    Protocol { message: String, status: Option<u16> },

    #[error("Command rejected by bridge: {message}")]
    CommandRejected { message: String, status: Option<u16> },

    // ── Runtime errors ───────────────────────────────────────────────
    #[error("Insteon runtime is disabled")]
    RuntimeDisabled,

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Device cache {path}: {message}")]
    Persistence { path: PathBuf, message: String },
}

impl CoreError {
    /// HTTP status reported by the bridge, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed { status } => Some(*status),
            Self::Protocol { status, .. } | Self::CommandRejected { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<homebrain_api::Error> for CoreError {
    fn from(err: homebrain_api::Error) -> Self {
        use homebrain_api::Error as Api;

        match err {
            Api::Connection { url, message } => Self::ConnectionFailed {
                url,
                reason: message,
            },
            Api::WebSocketConnect(reason) => Self::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket: {reason}"),
            },
            Api::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            Api::Authentication { status } => Self::AuthenticationFailed { status },
            Api::Protocol { message, status } => Self::Protocol { message, status },
            Api::CommandRejected { message, status } => Self::CommandRejected { message, status },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid bridge URL: {e}"),
            },
            Api::ClientBuild(message) => Self::Config { message },
        }
    }
}
