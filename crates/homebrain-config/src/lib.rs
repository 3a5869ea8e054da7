//! Settings for the HomeBrain Insteon runtime.
//!
//! Layered loading (defaults, TOML file, `HOMEBRAIN_*` environment),
//! auth token resolution, and translation to
//! `homebrain_core::RuntimeConfig`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use homebrain_core::RuntimeConfig;

/// Default bridge address when none is configured.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8765";

/// Cache file name inside the platform data directory.
pub const CACHE_FILE_NAME: &str = "insteon-devices.json";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// The Insteon section of the HomeBrain settings.
///
/// Keys are snake_case; the camelCase names used by the settings UI are
/// accepted as aliases in the TOML file.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "insteonEnabled")]
    pub insteon_enabled: bool,

    #[serde(alias = "insteonBridgeUrl")]
    pub insteon_bridge_url: String,

    /// Bearer token (plaintext; prefer `insteon_auth_token_env`). Empty
    /// means no token.
    #[serde(alias = "insteonAuthToken", skip_serializing_if = "Option::is_none")]
    pub insteon_auth_token: Option<String>,

    /// Name of an environment variable holding the token.
    #[serde(alias = "insteonAuthTokenEnv", skip_serializing_if = "Option::is_none")]
    pub insteon_auth_token_env: Option<String>,

    /// Poll interval in milliseconds.
    #[serde(alias = "insteonPollInterval")]
    pub insteon_poll_interval: u64,

    #[serde(alias = "requestTimeoutMs")]
    pub request_timeout_ms: u64,

    #[serde(alias = "deviceCachePath", skip_serializing_if = "Option::is_none")]
    pub device_cache_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            insteon_enabled: false,
            insteon_bridge_url: DEFAULT_BRIDGE_URL.into(),
            insteon_auth_token: None,
            insteon_auth_token_env: None,
            insteon_poll_interval: 30_000,
            request_timeout_ms: 8_000,
            device_cache_path: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("insteon_enabled", &self.insteon_enabled)
            .field("insteon_bridge_url", &self.insteon_bridge_url)
            .field(
                "insteon_auth_token",
                &self.insteon_auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("insteon_auth_token_env", &self.insteon_auth_token_env)
            .field("insteon_poll_interval", &self.insteon_poll_interval)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("device_cache_path", &self.device_cache_path)
            .finish()
    }
}

impl Settings {
    /// Parse and validate the bridge URL.
    pub fn bridge_url(&self) -> Result<Url, ConfigError> {
        let raw = self.insteon_bridge_url.trim();
        let url: Url = raw.parse().map_err(|e| ConfigError::Validation {
            field: "insteon_bridge_url".into(),
            reason: format!("{e}: {raw}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "insteon_bridge_url".into(),
                reason: format!("expected an http(s) URL, got '{raw}'"),
            });
        }
        Ok(url)
    }

    /// Resolve the bearer token: the named env var first, then the
    /// plaintext value. Blank values count as unset.
    pub fn auth_token(&self) -> Option<SecretString> {
        let from_env = self
            .insteon_auth_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());

        from_env
            .or_else(|| self.insteon_auth_token.clone())
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from)
    }

    /// Where the device cache lives.
    pub fn cache_path(&self) -> PathBuf {
        self.device_cache_path
            .clone()
            .unwrap_or_else(default_cache_path)
    }

    /// Build the runtime configuration. Out-of-range intervals are left
    /// to the runtime, which clamps them on read.
    pub fn to_runtime_config(&self) -> Result<RuntimeConfig, ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "request_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(RuntimeConfig::new(self.bridge_url()?)
            .with_enabled(self.insteon_enabled)
            .with_auth_token(self.auth_token())
            .with_poll_interval(Duration::from_millis(self.insteon_poll_interval))
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms)))
    }

    /// Key/value pairs for display, with the token masked.
    pub fn masked_entries(&self) -> Vec<(&'static str, String)> {
        let token = match (&self.insteon_auth_token_env, &self.insteon_auth_token) {
            (Some(name), _) if self.auth_token().is_some() => format!("****** (from ${name})"),
            (Some(name), _) => format!("(unset ${name})"),
            (None, Some(t)) if !t.trim().is_empty() => "******".into(),
            _ => "(none)".into(),
        };

        vec![
            ("insteon_enabled", self.insteon_enabled.to_string()),
            ("insteon_bridge_url", self.insteon_bridge_url.clone()),
            ("insteon_auth_token", token),
            ("insteon_poll_interval", format!("{} ms", self.insteon_poll_interval)),
            ("request_timeout_ms", format!("{} ms", self.request_timeout_ms)),
            ("device_cache_path", self.cache_path().display().to_string()),
        ]
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "homebrain", "homebrain")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default device cache location in the platform data directory.
pub fn default_cache_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join(CACHE_FILE_NAME),
        |dirs| dirs.data_dir().join(CACHE_FILE_NAME),
    )
}

fn dirs_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("homebrain");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from `path` (missing file is fine) and the environment.
///
/// Defaults come from `Settings::default()` through `#[serde(default)]`,
/// so a camelCase key in the file never collides with a seeded
/// snake_case default.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOMEBRAIN_"));

    let settings: Settings = figment.extract()?;
    Ok(settings)
}

/// Write a default config file to `path`, refusing to overwrite.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(&Settings::default())?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
