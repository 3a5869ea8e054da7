// ── Device cache file ──
//
// `{ devices, lastSync, lastSyncSummary, mockMode }` on disk. Writes go
// to a sibling `.tmp` file that is renamed over the target, so readers
// never observe a partial file.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use homebrain_api::RawDevice;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::StoreState;
use crate::error::CoreError;
use crate::model::{DeviceSnapshot, SyncSummary};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheFileRef<'a> {
    devices: Vec<&'a DeviceSnapshot>,
    last_sync: Option<DateTime<Utc>>,
    last_sync_summary: Option<&'a SyncSummary>,
    mock_mode: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CacheFile {
    devices: Vec<RawDevice>,
    last_sync: Option<DateTime<Utc>>,
    last_sync_summary: Option<SyncSummary>,
    mock_mode: bool,
}

/// Older caches are a bare device array.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnyCacheFile {
    Current(CacheFile),
    Legacy(Vec<RawDevice>),
}

/// Serialize `state` in the cache file format.
pub(crate) fn encode(state: &StoreState) -> Result<Vec<u8>, serde_json::Error> {
    let file = CacheFileRef {
        devices: state.devices.values().collect(),
        last_sync: state.last_sync,
        last_sync_summary: state.last_sync_summary.as_ref(),
        mock_mode: state.mock_mode,
    };
    serde_json::to_vec_pretty(&file)
}

/// Parse a cache file, re-normalizing every id. Entries without a usable
/// id are dropped.
pub(crate) fn decode(bytes: &[u8]) -> Result<StoreState, serde_json::Error> {
    let file = match serde_json::from_slice::<AnyCacheFile>(bytes)? {
        AnyCacheFile::Current(file) => file,
        AnyCacheFile::Legacy(devices) => CacheFile {
            devices,
            ..CacheFile::default()
        },
    };

    let mut devices: IndexMap<String, DeviceSnapshot> = IndexMap::with_capacity(file.devices.len());
    let mut dropped = 0_usize;
    for raw in file.devices {
        match DeviceSnapshot::from_raw(raw) {
            Some(device) => match devices.get_mut(&device.id) {
                Some(existing) => existing.merge(device),
                None => {
                    devices.insert(device.id.clone(), device);
                }
            },
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, "skipped cached devices without an identifier");
    }

    Ok(StoreState {
        devices,
        last_sync: file.last_sync,
        last_sync_summary: file.last_sync_summary,
        mock_mode: file.mock_mode,
    })
}

/// Hydrate from `path`. Missing or unreadable files yield an empty state.
pub(crate) async fn load(path: &Path) -> StoreState {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no device cache yet");
            return StoreState::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read device cache, starting empty");
            return StoreState::default();
        }
    };

    match decode(&bytes) {
        Ok(state) => {
            debug!(path = %path.display(), count = state.devices.len(), "device cache loaded");
            state
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt device cache, starting empty");
            StoreState::default()
        }
    }
}

/// Write-temp-then-rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let fail = |e: std::io::Error| CoreError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(fail(e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
