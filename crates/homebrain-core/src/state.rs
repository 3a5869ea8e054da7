// ── Runtime state ──
//
// Cached, in-memory facts about the bridge that the read path reports:
// last error, last health report, event stream state. Written by the
// poller, the stream task and manual syncs; read without any I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::CoreError;
use crate::model::{BridgeStatusSnapshot, LastError, SyncSummary};

/// Event stream connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamStatus {
    #[default]
    Disconnected,
    Connecting {
        attempt: u32,
    },
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { delay_ms } => write!(f, "reconnecting in {delay_ms}ms"),
        }
    }
}

/// Everything the runtime caches about the bridge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeState {
    /// Most recent poll/sync/command failure.
    pub last_error: Option<LastError>,
    pub bridge_status: Option<BridgeStatusSnapshot>,
    /// Mock flag as last reported by the bridge this session.
    pub bridge_mock: Option<bool>,
    pub stream: StreamStatus,
    /// Why the event stream last dropped. Kept apart from `last_error`.
    pub stream_error: Option<LastError>,
}

/// Shared writer for [`RuntimeState`].
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<RuntimeState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(RuntimeState::default());
        Self { tx }
    }

    pub(crate) fn current(&self) -> RuntimeState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.tx.subscribe()
    }

    pub(crate) fn record_error(&self, err: &CoreError) {
        let last = LastError::from(err);
        self.tx.send_modify(|s| s.last_error = Some(last));
    }

    pub(crate) fn clear_error(&self) {
        self.tx.send_if_modified(|s| s.last_error.take().is_some());
    }

    pub(crate) fn set_bridge_status(&self, status: BridgeStatusSnapshot) {
        self.tx.send_modify(|s| {
            s.bridge_mock = Some(status.mock_mode);
            s.bridge_status = Some(status);
        });
    }

    /// Mark the bridge unreachable without touching the mock flag.
    pub(crate) fn set_bridge_unreachable(&self, err: &CoreError) {
        let snapshot = BridgeStatusSnapshot {
            online: false,
            mock_mode: self.tx.borrow().bridge_mock.unwrap_or(false),
            mode: None,
            error: Some(err.to_string()),
            fetched_at: Utc::now(),
            details: serde_json::Map::new(),
        };
        self.tx.send_modify(|s| s.bridge_status = Some(snapshot));
    }

    pub(crate) fn set_stream(&self, stream: StreamStatus) {
        self.tx.send_if_modified(|s| {
            if s.stream == stream {
                return false;
            }
            s.stream = stream;
            true
        });
    }

    pub(crate) fn set_stream_error(&self, error: Option<LastError>) {
        self.tx.send_modify(|s| s.stream_error = error);
    }

    /// Forget everything learned from the bridge in the last session.
    /// `last_error` survives so operators still see why it stopped.
    pub(crate) fn reset_session(&self) {
        self.tx.send_modify(|s| {
            s.bridge_mock = None;
            s.bridge_status = None;
            s.stream = StreamStatus::Disconnected;
            s.stream_error = None;
        });
    }
}

/// The read path exposed to the HTTP layer and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub enabled: bool,
    pub running: bool,
    pub bridge_url: String,
    pub poll_interval_ms: u64,
    pub bridge_status: Option<BridgeStatusSnapshot>,
    pub device_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sync_summary: Option<SyncSummary>,
    pub last_error: Option<LastError>,
    pub mock_mode: bool,
    pub stream: StreamStatus,
    pub stream_error: Option<LastError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_error_only_notifies_on_change() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        cell.clear_error();
        assert!(!rx.has_changed().unwrap_or(true));

        cell.record_error(&CoreError::RuntimeDisabled);
        assert!(rx.has_changed().unwrap_or(false));
        rx.mark_unchanged();
        assert_eq!(
            cell.current().last_error.map(|e| e.message),
            Some("Insteon runtime is disabled".to_string())
        );

        cell.clear_error();
        assert!(rx.has_changed().unwrap_or(false));
        assert!(cell.current().last_error.is_none());
    }

    #[test]
    fn reset_session_keeps_last_error() {
        let cell = StateCell::new();
        cell.record_error(&CoreError::RuntimeDisabled);
        cell.set_stream(StreamStatus::Connected);
        cell.set_bridge_unreachable(&CoreError::Timeout { timeout_ms: 8000 });

        cell.reset_session();
        let state = cell.current();
        assert!(state.last_error.is_some());
        assert!(state.bridge_status.is_none());
        assert_eq!(state.stream, StreamStatus::Disconnected);
    }

    #[test]
    fn stream_status_serializes_tagged() {
        let json = serde_json::to_value(StreamStatus::Reconnecting { delay_ms: 4000 }).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "state": "reconnecting", "delayMs": 4000 }));
    }
}
