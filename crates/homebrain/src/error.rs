//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use homebrain_config::ConfigError;
use homebrain_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the bridge at {url}")]
    #[diagnostic(
        code(homebrain::connection_failed),
        help(
            "Check that the Insteon bridge service is running.\n\
             Reason: {reason}\n\
             Try: homebrain status --bridge-url <url>"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Bridge request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(homebrain::timeout),
        help("Raise request_timeout_ms or check the bridge's responsiveness.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Bridge rejected the auth token (HTTP {status})")]
    #[diagnostic(
        code(homebrain::auth_failed),
        help("Set insteon_auth_token, or name an env var in insteon_auth_token_env.")
    )]
    AuthFailed { status: u16 },

    // ── Bridge ───────────────────────────────────────────────────────

    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(homebrain::not_found),
        help("Run: homebrain devices (or homebrain discover --save to refresh the cache)")
    )]
    NotFound { identifier: String },

    #[error("Bridge error: {message}")]
    #[diagnostic(code(homebrain::protocol))]
    Protocol { message: String, status: Option<u16> },

    #[error("Bridge rejected the command: {message}")]
    #[diagnostic(code(homebrain::command_rejected))]
    CommandRejected { message: String, status: Option<u16> },

    #[error("Device cache error: {message}")]
    #[diagnostic(code(homebrain::cache))]
    Cache { message: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Insteon runtime is disabled")]
    #[diagnostic(
        code(homebrain::disabled),
        help("Set insteon_enabled = true in {path}")
    )]
    Disabled { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(homebrain::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(homebrain::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(homebrain::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Disabled { .. } | Self::Validation { .. } | Self::Config(_) => exit_code::CONFIG,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { status } => Self::AuthFailed { status },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::Protocol { message, status } => Self::Protocol { message, status },
            CoreError::CommandRejected { message, status } => {
                Self::CommandRejected { message, status }
            }
            CoreError::DeviceNotFound { identifier } => Self::NotFound { identifier },
            CoreError::RuntimeDisabled => Self::Disabled {
                path: homebrain_config::config_path().display().to_string(),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            err @ CoreError::Persistence { .. } => Self::Cache {
                message: err.to_string(),
            },
        }
    }
}

impl From<homebrain_api::Error> for CliError {
    fn from(err: homebrain_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
