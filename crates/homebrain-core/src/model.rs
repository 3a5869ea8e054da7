// ── Domain model ──
//
// Devices are kept as an opaque attribute bag keyed by a normalized id.
// The bridge owns the device schema; the store only owns identity.

use chrono::{DateTime, Utc};
use homebrain_api::{BridgeStatus, RawDevice};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// ── Identifiers ─────────────────────────────────────────────────────

/// Lower-case an Insteon address and strip everything that is not a hex
/// digit (`"4A.BC:01"` → `"4abc01"`). `None` when nothing is left.
pub fn normalize_id(raw: &str) -> Option<String> {
    let id: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!id.is_empty()).then_some(id)
}

fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── DeviceSnapshot ──────────────────────────────────────────────────

/// One device as last reported by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Normalized identifier; unique within the store.
    pub id: String,

    /// Everything else (`address`, `name`, `state`, `level`, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DeviceSnapshot {
    /// Build a snapshot from a bridge payload.
    ///
    /// The id comes from `id`, falling back to `address`. Returns `None`
    /// when neither yields a usable identifier.
    pub fn from_raw(mut raw: RawDevice) -> Option<Self> {
        let raw_id = raw.remove("id");
        let id = raw_id
            .as_ref()
            .and_then(identifier_text)
            .and_then(|s| normalize_id(&s))
            .or_else(|| {
                raw.get("address")
                    .and_then(identifier_text)
                    .and_then(|s| normalize_id(&s))
            })?;

        Some(Self {
            id,
            attributes: raw,
        })
    }

    /// Shallow merge: every top-level key of `incoming` wins, keys it
    /// lacks are kept.
    pub fn merge(&mut self, incoming: Self) {
        for (key, value) in incoming.attributes {
            self.attributes.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Address as the bridge last reported it.
    pub fn address(&self) -> Option<String> {
        self.get("address").and_then(identifier_text)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }
}

// ── Sync metadata ───────────────────────────────────────────────────

/// Which channel delivered a full sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    /// A bulk frame on the event stream.
    Ws,
    /// An HTTP discovery (poll or manual sync).
    Http,
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ws => "ws",
            Self::Http => "http",
        })
    }
}

/// Metadata of the most recent full synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub source: SyncSource,
    /// Bridge mode at sync time: `live`, `mock` or `unknown`.
    pub mode: String,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

impl SyncSummary {
    pub fn new(source: SyncSource, mode: Option<&str>, count: usize) -> Self {
        Self {
            source,
            mode: mode.unwrap_or("unknown").to_owned(),
            count,
            timestamp: Utc::now(),
        }
    }

    /// `Some(true)` for mock, `Some(false)` for live, `None` otherwise.
    pub fn mock_mode(&self) -> Option<bool> {
        match self.mode.as_str() {
            "mock" => Some(true),
            "live" => Some(false),
            _ => None,
        }
    }
}

// ── Bridge health ───────────────────────────────────────────────────

/// Last-known health report, superseded on every status fetch or
/// `bridge_status` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatusSnapshot {
    pub online: bool,
    pub mock_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Failure text reported by the bridge itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Remaining bridge fields (port, attempt counters, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl From<BridgeStatus> for BridgeStatusSnapshot {
    fn from(status: BridgeStatus) -> Self {
        Self {
            online: status.is_online(),
            mock_mode: status.is_mock(),
            mode: status.mode,
            error: status.error,
            fetched_at: Utc::now(),
            details: status.extra,
        }
    }
}

// ── Errors as state ─────────────────────────────────────────────────

/// The most recent sync failure, as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl LastError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            status: None,
        }
    }
}

impl From<&CoreError> for LastError {
    fn from(err: &CoreError) -> Self {
        Self {
            message: err.to_string(),
            timestamp: Utc::now(),
            status: err.status(),
        }
    }
}
