// DeviceStateStore persistence round-trips against real files.
#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use homebrain_api::RawDevice;
use homebrain_core::{DeviceStateStore, SyncSource, SyncSummary};

fn raw(value: Value) -> RawDevice {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("test payloads are objects"),
    }
}

#[tokio::test]
async fn replace_all_round_trips_through_the_cache_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("insteon-devices.json");

    let store = DeviceStateStore::open(&path).await;
    assert!(store.is_empty());
    store
        .replace_all(
            vec![
                raw(json!({ "id": "4A.BC.01", "address": "4A.BC.01", "name": "Lamp", "level": 0, "groups": [1, 2] })),
                raw(json!({ "address": "11:22:33", "name": "Fan", "state": { "on": true } })),
            ],
            SyncSummary::new(SyncSource::Http, Some("mock"), 2),
        )
        .await
        .unwrap();
    let written = store.snapshot();
    drop(store);

    let reopened = DeviceStateStore::open(&path).await;
    assert_eq!(*reopened.snapshot(), *written);
    assert!(reopened.mock_mode());
    assert_eq!(reopened.device("112233").unwrap().address().as_deref(), Some("11:22:33"));
}

#[tokio::test]
async fn cache_file_uses_the_documented_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices.json");

    let store = DeviceStateStore::open(&path).await;
    store
        .merge_snapshot(raw(json!({ "id": "aabbcc", "name": "Porch" })), true)
        .await
        .unwrap();

    let file: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(file["devices"], json!([{ "id": "aabbcc", "name": "Porch" }]));
    assert_eq!(file["lastSync"], Value::Null);
    assert_eq!(file["lastSyncSummary"], Value::Null);
    assert_eq!(file["mockMode"], json!(false));
}

#[tokio::test]
async fn non_persisting_merges_reach_disk_with_the_next_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices.json");

    let store = DeviceStateStore::open(&path).await;
    store
        .merge_snapshot(raw(json!({ "id": "010203", "level": 10 })), false)
        .await
        .unwrap();
    assert!(!path.exists());

    store.remove_by_id("ffffff", true).await.unwrap();
    assert!(!path.exists(), "a no-op removal does not write");

    store
        .merge_snapshot(raw(json!({ "id": "040506" })), true)
        .await
        .unwrap();
    let reopened = DeviceStateStore::open(&path).await;
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.device("010203").unwrap().get("level"), Some(&json!(10)));
}

#[tokio::test]
async fn clear_persists_an_empty_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices.json");

    let store = DeviceStateStore::open(&path).await;
    store
        .replace_all(
            vec![raw(json!({ "id": "0a0b0c" }))],
            SyncSummary::new(SyncSource::Ws, Some("live"), 1),
        )
        .await
        .unwrap();
    store.clear().await.unwrap();

    let reopened = DeviceStateStore::open(&path).await;
    assert!(reopened.is_empty());
    assert!(reopened.last_sync().is_none());
}

#[tokio::test]
async fn mock_flag_change_is_written_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices.json");

    let store = DeviceStateStore::open(&path).await;
    assert!(store.set_mock_mode(true).await.unwrap());

    let cache: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(cache["mockMode"], json!(true));
    assert!(DeviceStateStore::open(&path).await.mock_mode());

    // Unchanged flag: nothing to write.
    std::fs::remove_file(&path).unwrap();
    assert!(!store.set_mock_mode(true).await.unwrap());
    assert!(!path.exists());
}
