// ── Bridge HTTP wire models ──
//
// Shapes of the JSON bodies exchanged with the bridge. Device payloads
// stay an opaque attribute bag: the bridge owns their schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One device as the bridge reports it: an untyped attribute map that
/// normally carries `id`, `address`, `name`, `state`, `category`, ...
pub type RawDevice = Map<String, Value>;

/// Every bridge response is wrapped as `{ "success": bool, ... }`.
///
/// `success` is optional so bare bodies from older bridges still parse.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    /// The bridge's own failure text, if it reported `success: false`.
    pub(crate) fn failure(&self) -> Option<String> {
        if self.success == Some(false) {
            Some(
                self.error
                    .clone()
                    .or_else(|| self.message.clone())
                    .unwrap_or_else(|| "bridge reported success=false".into()),
            )
        } else {
            None
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// Health report from `GET /status` or a `bridge_status` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StatusPayload")]
pub struct BridgeStatus {
    /// Whether the bridge holds a live modem connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_mode: Option<bool>,

    /// `"live"` or `"mock"` on current bridges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Bridge-side failure text (`error` on frames, `last_error` on /status).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Everything else the bridge sends (port, attempt counters, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire form of [`BridgeStatus`]; `error` wins over `last_error` when a
/// body carries both.
#[derive(Deserialize)]
struct StatusPayload {
    #[serde(default)]
    connected: Option<bool>,
    #[serde(default)]
    online: Option<bool>,
    #[serde(default)]
    mock_mode: Option<bool>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    last_error: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<StatusPayload> for BridgeStatus {
    fn from(p: StatusPayload) -> Self {
        Self {
            connected: p.connected,
            online: p.online,
            mock_mode: p.mock_mode,
            mode: p.mode,
            error: p.error.or(p.last_error),
            extra: p.extra,
        }
    }
}

impl BridgeStatus {
    /// A reachable bridge that does not say otherwise is online.
    pub fn is_online(&self) -> bool {
        self.connected.or(self.online).unwrap_or(true)
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode.unwrap_or(false) || self.mode.as_deref() == Some("mock")
    }
}

// ── Discovery ───────────────────────────────────────────────────────

/// Body of `GET /discovery`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(default)]
    pub mode: Option<String>,
    pub devices: Vec<RawDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Discovery {
    pub fn is_mock(&self) -> bool {
        self.mode.as_deref() == Some("mock")
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Body of `POST /devices/{id}/commands`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,

    /// 0–100 is a percentage, 101–255 a raw on-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fast: bool,

    /// Ramp duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            level: None,
            fast: false,
            duration: None,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mock_detection_uses_flag_or_mode() {
        let by_flag: BridgeStatus = serde_json::from_value(json!({ "mock_mode": true })).unwrap();
        assert!(by_flag.is_mock());

        let by_mode: BridgeStatus = serde_json::from_value(json!({ "mode": "mock" })).unwrap();
        assert!(by_mode.is_mock());

        let live: BridgeStatus =
            serde_json::from_value(json!({ "mode": "live", "connected": false })).unwrap();
        assert!(!live.is_mock());
        assert!(!live.is_online());
    }

    #[test]
    fn status_keeps_unknown_fields() {
        let status: BridgeStatus = serde_json::from_value(json!({
            "connected": true,
            "port": "/dev/insteon",
            "connect_attempts": 3,
            "last_error": "PLM timeout"
        }))
        .unwrap();
        assert!(status.is_online());
        assert_eq!(status.error.as_deref(), Some("PLM timeout"));
        assert_eq!(status.extra["port"], "/dev/insteon");
        assert_eq!(status.extra["connect_attempts"], 3);
    }

    #[test]
    fn status_accepts_both_error_spellings() {
        let status: BridgeStatus = serde_json::from_value(json!({
            "connected": false,
            "error": "modem unplugged",
            "last_error": "PLM timeout"
        }))
        .unwrap();
        assert_eq!(status.error.as_deref(), Some("modem unplugged"));
        assert!(!status.extra.contains_key("last_error"));
    }

    #[test]
    fn command_request_omits_unset_fields() {
        let plain = serde_json::to_value(CommandRequest::new("off")).unwrap();
        assert_eq!(plain, json!({ "command": "off" }));

        let full = serde_json::to_value(
            CommandRequest::new("on")
                .with_level(50)
                .with_fast(true)
                .with_duration(2.5),
        )
        .unwrap();
        assert_eq!(
            full,
            json!({ "command": "on", "level": 50, "fast": true, "duration": 2.5 })
        );
    }

    #[test]
    fn envelope_failure_prefers_error_text() {
        let env: Envelope =
            serde_json::from_value(json!({ "success": false, "error": "PLM not connected" }))
                .unwrap();
        assert_eq!(env.failure().as_deref(), Some("PLM not connected"));

        let ok: Envelope = serde_json::from_value(json!({ "success": true })).unwrap();
        assert!(ok.failure().is_none());
    }
}
