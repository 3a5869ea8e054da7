// ── Runtime controller ──
//
// Lifecycle owner of the bridge subsystem. The only place that starts
// or stops the poll scheduler and the event stream, and the only place
// that reacts to configuration changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use homebrain_api::{BridgeClient, CommandRequest, EventStream, StreamMessage};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::model::{DeviceSnapshot, normalize_id};
use crate::poller::{PollScheduler, Poller};
use crate::state::{RuntimeState, RuntimeStatus, StateCell};
use crate::store::DeviceStateStore;
use crate::sync::{apply_stream_message, sync_discovery};

// ── RuntimeController ────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Owns the cached
/// [`BridgeClient`], the poll scheduler and the event stream for as long
/// as the runtime is enabled.
#[derive(Clone)]
pub struct RuntimeController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: Arc<ArcSwap<RuntimeConfig>>,
    store: Arc<DeviceStateStore>,
    state: Arc<StateCell>,
    /// Built from `(bridge_url, auth_token)`; replaced, never mutated.
    client: ArcSwapOption<BridgeClient>,
    /// Serializes lifecycle transitions.
    active: Mutex<Option<ActiveRuntime>>,
    running: AtomicBool,
    /// Every background task the runtime spawns.
    tasks: TaskTracker,
    /// Parent of every per-session token; cancelled on shutdown.
    shutdown: CancellationToken,
}

/// Resources owned by one enabled session.
struct ActiveRuntime {
    cancel: CancellationToken,
    poll: PollScheduler,
    stream: JoinHandle<()>,
}

impl RuntimeController {
    /// Create a controller. Does NOT start anything; call
    /// [`start()`](Self::start).
    pub fn new(config: RuntimeConfig, store: Arc<DeviceStateStore>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config: Arc::new(ArcSwap::from_pointee(config)),
                store,
                state: Arc::new(StateCell::new()),
                client: ArcSwapOption::empty(),
                active: Mutex::new(None),
                running: AtomicBool::new(false),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the runtime if the configuration enables it.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut active = self.inner.active.lock().await;
        if active.is_some() {
            return Ok(());
        }
        if !self.inner.config.load().enabled {
            info!("insteon runtime disabled by configuration");
            return Ok(());
        }
        self.launch(&mut active)
    }

    /// Turn the runtime on: fresh client, immediate poll, event stream.
    pub async fn enable(&self) -> Result<(), CoreError> {
        let mut active = self.inner.active.lock().await;
        self.set_enabled(true);
        if active.is_some() {
            return Ok(());
        }
        self.launch(&mut active)
    }

    /// Turn the runtime off: stop polling, close the stream cleanly and
    /// forget the bridge-reported mode.
    pub async fn disable(&self) {
        let mut active = self.inner.active.lock().await;
        self.set_enabled(false);
        self.halt(&mut active).await;
    }

    /// Swap in a new configuration.
    ///
    /// A change to the enabled flag, bridge URL, token or timings is
    /// handled as disable followed by enable, so no task keeps a client
    /// built for the old settings.
    pub async fn apply_config(&self, next: RuntimeConfig) -> Result<(), CoreError> {
        let mut active = self.inner.active.lock().await;
        let next = Arc::new(next);
        let previous = self.inner.config.swap(Arc::clone(&next));

        let restart = previous.requires_restart(&next) || (next.enabled && active.is_none());
        if !restart {
            debug!("configuration change does not affect the runtime");
            return Ok(());
        }

        info!(enabled = next.enabled, url = %next.bridge_url, "applying runtime configuration");
        self.halt(&mut active).await;
        if next.enabled {
            self.launch(&mut active)?;
        }
        Ok(())
    }

    /// Stop everything for good. Later `enable`/`start` calls fail with
    /// [`CoreError::RuntimeDisabled`].
    pub async fn shutdown(&self) {
        let mut active = self.inner.active.lock().await;
        self.halt(&mut active).await;
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        debug!("runtime controller shut down");
    }

    /// Whether the poll scheduler and event stream are running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Background tasks still alive. Zero whenever the runtime is off.
    pub fn active_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    fn set_enabled(&self, enabled: bool) {
        self.inner.config.rcu(|current| {
            let mut next = RuntimeConfig::clone(current);
            next.enabled = enabled;
            next
        });
    }

    fn launch(&self, active: &mut Option<ActiveRuntime>) -> Result<(), CoreError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(CoreError::RuntimeDisabled);
        }
        let config = self.inner.config.load_full();

        // Never carry a client over from the previous session.
        self.inner.client.store(None);
        let built = build_client(&config).and_then(|client| {
            let ws_url = client.websocket_url()?;
            Ok((Arc::new(client), ws_url))
        });
        let (client, ws_url) = match built {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "cannot start insteon runtime");
                self.inner.state.record_error(&e);
                return Err(e);
            }
        };
        self.inner.client.store(Some(Arc::clone(&client)));

        let cancel = self.inner.shutdown.child_token();

        let poller = Arc::new(Poller::new(
            client,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.state),
            Arc::clone(&self.inner.config),
        ));
        let poll = PollScheduler::start(poller, cancel.child_token(), &self.inner.tasks);

        let (stream, rx) = EventStream::spawn(
            ws_url,
            config.transport(),
            config.reconnect.clone(),
            cancel.child_token(),
        );
        let stream = self.inner.tasks.spawn(stream_task(
            stream,
            rx,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.state),
            cancel.clone(),
        ));

        *active = Some(ActiveRuntime {
            cancel,
            poll,
            stream,
        });
        self.inner.running.store(true, Ordering::Release);
        info!(
            url = %config.bridge_url,
            poll_interval_ms = u64::try_from(config.effective_poll_interval().as_millis()).unwrap_or(u64::MAX),
            "insteon runtime started"
        );
        Ok(())
    }

    async fn halt(&self, active: &mut Option<ActiveRuntime>) {
        let Some(runtime) = active.take() else {
            return;
        };

        runtime.cancel.cancel();
        runtime.poll.stop().await;
        if let Err(e) = runtime.stream.await {
            warn!(error = %e, "event stream task panicked");
        }

        self.inner.client.store(None);
        self.inner.state.reset_session();
        self.inner.running.store(false, Ordering::Release);
        info!("insteon runtime stopped");
    }

    // ── Read path (never touches the network) ────────────────────

    /// Current effective state, from memory only.
    pub fn status(&self) -> RuntimeStatus {
        let config = self.inner.config.load();
        let store = self.inner.store.snapshot();
        let state = self.inner.state.current();

        RuntimeStatus {
            enabled: config.enabled,
            running: self.is_running(),
            bridge_url: config.bridge_url.to_string(),
            poll_interval_ms: u64::try_from(config.effective_poll_interval().as_millis())
                .unwrap_or(u64::MAX),
            bridge_status: state.bridge_status,
            device_count: store.devices.len(),
            last_sync: store.last_sync,
            last_sync_summary: store.last_sync_summary.clone(),
            last_error: state.last_error,
            mock_mode: state.bridge_mock.unwrap_or(store.mock_mode),
            stream: state.stream,
            stream_error: state.stream_error,
        }
    }

    /// Subscribe to runtime state changes (errors, bridge health, stream).
    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.inner.state.subscribe()
    }

    /// Look up one device; `id` is normalized first.
    pub fn device(&self, id: &str) -> Option<DeviceSnapshot> {
        self.inner.store.device(id)
    }

    /// Every cached device in bridge order.
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.inner.store.devices()
    }

    // ── Bridge operations ────────────────────────────────────────

    /// Force a discovery now and replace the store with it.
    ///
    /// Failures are recorded as `last_error` and returned.
    pub async fn sync_now(&self, refresh: bool) -> Result<usize, CoreError> {
        let client = self.client()?;
        match sync_discovery(&client, &self.inner.store, refresh).await {
            Ok(count) => {
                self.inner.state.clear_error();
                info!(count, refresh, "manual sync complete");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "manual sync failed");
                self.inner.state.record_error(&e);
                Err(e)
            }
        }
    }

    /// Dispatch a device command through the cached client.
    pub async fn send_command(
        &self,
        device_id: &str,
        request: &CommandRequest,
    ) -> Result<Value, CoreError> {
        let client = self.client()?;
        let id = normalize_id(device_id).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: device_id.to_owned(),
        })?;

        debug!(device_id = %id, command = %request.command, "sending device command");
        client
            .send_command(&id, request)
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| {
                warn!(device_id = %id, error = %e, "device command failed");
                self.inner.state.record_error(e);
            })
    }

    /// The cached client, rebuilt from the current configuration when
    /// the cache is empty.
    fn client(&self) -> Result<Arc<BridgeClient>, CoreError> {
        let config = self.inner.config.load();
        if !config.enabled {
            return Err(CoreError::RuntimeDisabled);
        }
        if let Some(client) = self.inner.client.load_full() {
            return Ok(client);
        }
        let client = Arc::new(build_client(&config)?);
        self.inner.client.store(Some(Arc::clone(&client)));
        Ok(client)
    }
}

impl std::fmt::Debug for RuntimeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeController")
            .field("bridge_url", &self.inner.config.load().bridge_url.as_str())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Client factory keyed on the connection settings.
fn build_client(config: &RuntimeConfig) -> Result<BridgeClient, CoreError> {
    Ok(BridgeClient::new(
        config.bridge_url.clone(),
        config.transport(),
    )?)
}

/// Single consumer of the event stream: applies messages in arrival
/// order, then closes the stream when the session ends.
async fn stream_task(
    stream: EventStream,
    mut rx: mpsc::Receiver<StreamMessage>,
    store: Arc<DeviceStateStore>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        apply_stream_message(&store, &state, message).await;
    }

    stream.close().await;
    debug!("event stream consumer exiting");
}
