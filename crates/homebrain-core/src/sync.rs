// ── Applying bridge data ──
//
// The single place where bridge payloads turn into store mutations:
// event stream frames, stream lifecycle notices and HTTP discoveries.

use homebrain_api::{BridgeClient, BridgeEvent, StreamMessage};
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::model::{BridgeStatusSnapshot, LastError, SyncSource, SyncSummary};
use crate::state::{StateCell, StreamStatus};
use crate::store::DeviceStateStore;

/// Fetch a discovery (no store lock held while waiting) and replace the
/// collection with it. Returns the resulting device count.
pub(crate) async fn sync_discovery(
    client: &BridgeClient,
    store: &DeviceStateStore,
    refresh: bool,
) -> Result<usize, CoreError> {
    let discovery = client.discovery(refresh).await?;
    let reported = discovery.count.unwrap_or(discovery.devices.len());
    let summary = SyncSummary::new(SyncSource::Http, discovery.mode.as_deref(), reported);
    store.replace_all(discovery.devices, summary).await?;
    let count = store.len();
    debug!(count, refresh, "discovery applied");
    Ok(count)
}

/// Apply one message from the event stream task, in arrival order.
pub(crate) async fn apply_stream_message(
    store: &DeviceStateStore,
    state: &StateCell,
    message: StreamMessage,
) {
    match message {
        StreamMessage::Connecting { attempt } => {
            state.set_stream(StreamStatus::Connecting { attempt });
        }
        StreamMessage::Connected => {
            state.set_stream(StreamStatus::Connected);
            state.set_stream_error(None);
            state.clear_error();
        }
        StreamMessage::Disconnected { reason, retry_in } => {
            let delay_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX);
            state.set_stream(StreamStatus::Reconnecting { delay_ms });
            state.set_stream_error(Some(LastError::new(reason)));
        }
        StreamMessage::Event(event) => apply_event(store, state, event).await,
    }
}

/// Apply one decoded frame.
///
/// Every frame of a state-changing kind counts as evidence of a healthy
/// bridge and clears `last_error`.
pub(crate) async fn apply_event(store: &DeviceStateStore, state: &StateCell, event: BridgeEvent) {
    let result = match event {
        BridgeEvent::BridgeStatus(status) => {
            let snapshot = BridgeStatusSnapshot::from(status);
            let mock_mode = snapshot.mock_mode;
            state.set_bridge_status(snapshot);
            store.set_mock_mode(mock_mode).await.map(drop)
        }
        BridgeEvent::DeviceSnapshot(batch) => {
            let reported = batch.count.unwrap_or(batch.devices.len());
            debug!(kind = %batch.kind, count = reported, "bulk device frame");
            let summary = SyncSummary::new(SyncSource::Ws, batch.mode.as_deref(), reported);
            store.replace_all(batch.devices, summary).await
        }
        BridgeEvent::DeviceAdded { device } => match device {
            Some(device) => store.merge_snapshot(device, true).await.map(drop),
            None => Ok(()),
        },
        BridgeEvent::DeviceRemoved { device_id } => match device_id {
            Some(id) => store.remove_by_id(&id, true).await.map(drop),
            None => Ok(()),
        },
        BridgeEvent::DeviceUpdate { device, detail } => match device {
            Some(device) => store.merge_snapshot(device, false).await.map(drop),
            None => {
                trace!(?detail, "device event without device payload");
                Ok(())
            }
        },
        BridgeEvent::CommandAck(ack) => {
            if ack.success == Some(false) {
                warn!(
                    device_id = ack.device_id.as_deref().unwrap_or("?"),
                    command = ack.command.as_deref().unwrap_or("?"),
                    "bridge acknowledged a failed command"
                );
                return;
            }
            Ok(())
        }
        BridgeEvent::Unknown { kind } => {
            trace!(%kind, "ignoring unknown event type");
            return;
        }
    };

    match result {
        Ok(()) => state.clear_error(),
        Err(e) => warn!(error = %e, "failed to persist device cache"),
    }
}
