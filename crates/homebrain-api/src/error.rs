use thiserror::Error;

/// Top-level error type for the `homebrain-api` crate.
///
/// Covers every failure mode of the bridge surfaces: HTTP transport,
/// authentication, response decoding, command rejection and the WebSocket
/// event stream. `homebrain-core` maps these into runtime diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// TCP connect refused, DNS failure, connection reset mid-request.
    #[error("Cannot reach bridge at {url}: {message}")]
    Connection { url: String, message: String },

    /// The per-call deadline elapsed before the bridge answered.
    #[error("Bridge request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The underlying HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Authentication ──────────────────────────────────────────────
    /// The bridge rejected the bearer token (HTTP 401/403).
    #[error("Bridge rejected credentials (HTTP {status})")]
    Authentication { status: u16 },

    // ── Protocol ────────────────────────────────────────────────────
    /// Non-JSON body, unexpected body shape or unexpected status code.
    #[error("Bridge protocol error: {message}")]
    Protocol { message: String, status: Option<u16> },

    /// The bridge understood the command and refused it.
    #[error("Command rejected by bridge: {message}")]
    CommandRejected { message: String, status: Option<u16> },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake or read failure.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),
}

/// Coarse classification used for retry decisions and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Auth,
    Timeout,
    Protocol,
}

impl Error {
    /// Map this error onto the four-way bridge error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::WebSocketConnect(_) => ErrorKind::Connection,
            Self::Authentication { .. } => ErrorKind::Auth,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. }
            | Self::CommandRejected { .. }
            | Self::InvalidUrl(_)
            | Self::ClientBuild(_) => ErrorKind::Protocol,
        }
    }

    /// HTTP status reported by the bridge, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status } => Some(*status),
            Self::Protocol { status, .. } | Self::CommandRejected { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout)
    }

    /// Translate a `reqwest` failure into the bridge taxonomy.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_ms }
        } else if err.is_decode() || err.is_body() {
            Self::Protocol {
                message: err.to_string(),
                status: err.status().map(|s| s.as_u16()),
            }
        } else {
            Self::Connection {
                url: err
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                message: err.to_string(),
            }
        }
    }
}
