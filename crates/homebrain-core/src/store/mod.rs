// ── Device state store ──
//
// The authoritative view of bridge devices. State lives behind a
// `watch` channel: every mutation runs inside `send_if_modified`, which
// holds the channel's write lock for the duration of the closure, so
// mutations never interleave and subscribers see whole states only.

mod persist;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use homebrain_api::RawDevice;
use indexmap::IndexMap;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{DeviceSnapshot, SyncSummary, normalize_id};

/// Everything the store knows, as one immutable value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Keyed by normalized id, in first-seen order.
    pub devices: IndexMap<String, DeviceSnapshot>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sync_summary: Option<SyncSummary>,
    pub mock_mode: bool,
}

/// Mutation-serialized device collection with optional file persistence.
pub struct DeviceStateStore {
    state: watch::Sender<Arc<StoreState>>,
    path: Option<PathBuf>,
    /// Serializes cache writes so a slower, older write never lands last.
    write_lock: Mutex<()>,
}

impl DeviceStateStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_state(StoreState::default(), None)
    }

    /// Open the store backed by `path`, hydrating from it when present.
    ///
    /// Never fails: a missing or corrupt cache yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = persist::load(&path).await;
        info!(
            path = %path.display(),
            count = state.devices.len(),
            "device store opened"
        );
        Self::with_state(state, Some(path))
    }

    fn with_state(state: StoreState, path: Option<PathBuf>) -> Self {
        let (state, _) = watch::channel(Arc::new(state));
        Self {
            state,
            path,
            write_lock: Mutex::new(()),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current state (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.state.borrow())
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreState>> {
        self.state.subscribe()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().devices.is_empty()
    }

    /// Look up one device; `id` is normalized first.
    pub fn device(&self, id: &str) -> Option<DeviceSnapshot> {
        let id = normalize_id(id)?;
        self.state.borrow().devices.get(&id).cloned()
    }

    /// All devices in store order.
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.state.borrow().devices.values().cloned().collect()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_sync
    }

    pub fn mock_mode(&self) -> bool {
        self.state.borrow().mock_mode
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Upsert one device with a shallow merge over any existing entry.
    ///
    /// Payloads without a usable `id`/`address` are dropped. Returns
    /// whether the payload was applied.
    pub async fn merge_snapshot(&self, raw: RawDevice, persist: bool) -> Result<bool, CoreError> {
        let Some(incoming) = DeviceSnapshot::from_raw(raw) else {
            debug!("dropping device payload without an identifier");
            return Ok(false);
        };

        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            match state.devices.get_mut(&incoming.id) {
                Some(existing) => existing.merge(incoming),
                None => {
                    state.devices.insert(incoming.id.clone(), incoming);
                }
            }
        });

        if persist {
            self.persist().await?;
        }
        Ok(true)
    }

    /// Delete one device. Absent ids are a no-op.
    pub async fn remove_by_id(&self, id: &str, persist: bool) -> Result<bool, CoreError> {
        let Some(id) = normalize_id(id) else {
            return Ok(false);
        };

        let removed = self.state.send_if_modified(|state| {
            if !state.devices.contains_key(&id) {
                return false;
            }
            Arc::make_mut(state).devices.shift_remove(&id);
            true
        });

        if removed {
            debug!(device_id = %id, "device removed");
            if persist {
                self.persist().await?;
            }
        }
        Ok(removed)
    }

    /// Replace the whole collection after a full sync and persist.
    ///
    /// Devices missing from `devices` are gone afterwards. A `live` or
    /// `mock` summary mode also sets the persisted mock flag.
    pub async fn replace_all(
        &self,
        devices: Vec<RawDevice>,
        summary: SyncSummary,
    ) -> Result<(), CoreError> {
        let mut next: IndexMap<String, DeviceSnapshot> = IndexMap::with_capacity(devices.len());
        for device in devices.into_iter().filter_map(DeviceSnapshot::from_raw) {
            match next.get_mut(&device.id) {
                Some(existing) => existing.merge(device),
                None => {
                    next.insert(device.id.clone(), device);
                }
            }
        }

        let count = next.len();
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.devices = next;
            state.last_sync = Some(summary.timestamp);
            if let Some(mock) = summary.mock_mode() {
                state.mock_mode = mock;
            }
            state.last_sync_summary = Some(summary);
        });
        debug!(count, "device collection replaced");

        self.persist().await
    }

    /// Empty the store and forget the last sync.
    pub async fn clear(&self) -> Result<(), CoreError> {
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.devices.clear();
            state.last_sync = None;
            state.last_sync_summary = None;
        });
        self.persist().await
    }

    /// Record the bridge's mock flag, persisting when it changed.
    /// Returns whether it changed.
    pub async fn set_mock_mode(&self, mock: bool) -> Result<bool, CoreError> {
        let changed = self.state.send_if_modified(|state| {
            if state.mock_mode == mock {
                return false;
            }
            Arc::make_mut(state).mock_mode = mock;
            true
        });
        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    /// Write the current state to the backing file. No-op in memory.
    pub async fn persist(&self) -> Result<(), CoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        // Snapshot under the write lock: the last writer always holds the
        // newest state.
        let state = self.snapshot();
        let bytes = persist::encode(&state).map_err(|e| CoreError::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        persist::write_atomic(path, &bytes).await?;
        debug!(path = %path.display(), count = state.devices.len(), "device cache written");
        Ok(())
    }
}

impl std::fmt::Debug for DeviceStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStateStore")
            .field("path", &self.path)
            .field("devices", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::SyncSource;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawDevice {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    #[tokio::test]
    async fn merges_by_normalized_id() {
        let store = DeviceStateStore::in_memory();
        store
            .merge_snapshot(raw(json!({ "id": "4abc01", "name": "Lamp", "level": 0 })), false)
            .await
            .unwrap();
        store
            .merge_snapshot(raw(json!({ "id": "4a:bc:01", "level": 50 })), false)
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            serde_json::to_value(store.device("4abc01").unwrap()).unwrap(),
            json!({ "id": "4abc01", "name": "Lamp", "level": 50 })
        );
    }

    #[tokio::test]
    async fn merge_sequence_is_last_write_wins() {
        let store = DeviceStateStore::in_memory();
        let writes = [
            json!({ "id": "aa.bb.cc", "level": 1, "name": "Hall" }),
            json!({ "address": "AA:BB:CC", "level": 2 }),
            json!({ "id": "AABBCC", "state": "on" }),
            json!({ "id": "aabbcc", "level": 3, "state": "off" }),
        ];
        for w in writes {
            store.merge_snapshot(raw(w), false).await.unwrap();
        }

        let device = store.device("aa:bb:cc").unwrap();
        assert_eq!(device.get("level"), Some(&json!(3)));
        assert_eq!(device.get("state"), Some(&json!("off")));
        assert_eq!(device.name(), Some("Hall"));
        assert_eq!(device.address().as_deref(), Some("AA:BB:CC"));
    }

    #[tokio::test]
    async fn unidentified_payload_is_dropped() {
        let store = DeviceStateStore::in_memory();
        let applied = store
            .merge_snapshot(raw(json!({ "name": "who?" })), true)
            .await
            .unwrap();
        assert!(!applied);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn removing_unknown_id_is_a_noop() {
        let store = DeviceStateStore::in_memory();
        store
            .merge_snapshot(raw(json!({ "id": "112233" })), false)
            .await
            .unwrap();
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        assert!(!store.remove_by_id("445566", true).await.unwrap());
        assert!(!store.remove_by_id("::", true).await.unwrap());
        assert_eq!(store.len(), 1);
        assert!(!rx.has_changed().unwrap());

        assert!(store.remove_by_id("11.22.33", false).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn replace_all_supersedes_previous_devices() {
        let store = DeviceStateStore::in_memory();
        store
            .merge_snapshot(raw(json!({ "id": "000001", "name": "Old" })), false)
            .await
            .unwrap();

        let summary = SyncSummary::new(SyncSource::Http, Some("mock"), 2);
        let at = summary.timestamp;
        store
            .replace_all(
                vec![
                    raw(json!({ "id": "0A0B0C", "name": "New" })),
                    raw(json!({ "name": "no id" })),
                    raw(json!({ "address": "0d.0e.0f" })),
                ],
                summary,
            )
            .await
            .unwrap();

        let state = store.snapshot();
        assert_eq!(
            state.devices.keys().cloned().collect::<Vec<_>>(),
            vec!["0a0b0c".to_string(), "0d0e0f".to_string()]
        );
        assert_eq!(state.last_sync, Some(at));
        assert!(state.mock_mode);
        assert_eq!(state.last_sync_summary.as_ref().unwrap().source, SyncSource::Http);
    }

    #[tokio::test]
    async fn clear_forgets_sync_metadata() {
        let store = DeviceStateStore::in_memory();
        store
            .replace_all(
                vec![raw(json!({ "id": "010203" }))],
                SyncSummary::new(SyncSource::Ws, None, 1),
            )
            .await
            .unwrap();
        store.clear().await.unwrap();

        let state = store.snapshot();
        assert!(state.devices.is_empty());
        assert!(state.last_sync.is_none());
        assert!(state.last_sync_summary.is_none());
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let store = DeviceStateStore::in_memory();
        let mut rx = store.subscribe();

        store
            .merge_snapshot(raw(json!({ "id": "abcdef" })), false)
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().devices.len(), 1);

        assert!(store.set_mock_mode(true).await.unwrap());
        assert!(!store.set_mock_mode(true).await.unwrap());
        rx.changed().await.unwrap();
        assert!(rx.borrow().mock_mode);
    }
}
