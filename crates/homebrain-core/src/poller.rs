// ── Poll scheduler ──
//
// Fallback discovery for when the event stream is silent. One task, one
// pending timer: tick, then sleep for the current poll interval, until
// the runtime's cancellation token fires. Cancellation only interrupts
// the sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use homebrain_api::{BridgeClient, ErrorKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::model::BridgeStatusSnapshot;
use crate::state::StateCell;
use crate::store::{DeviceStateStore, StoreState};
use crate::sync::sync_discovery;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another tick was still in flight.
    Skipped,
    /// The store was fresh enough; only the status was refreshed.
    Fresh,
    /// A discovery replaced the store with `count` devices.
    Synced { count: usize },
    /// The discovery failed; the error is in `last_error`.
    Failed,
}

/// Whether the store needs a full discovery at `now`.
pub fn is_stale(state: &StoreState, threshold: Duration, now: DateTime<Utc>) -> bool {
    let Some(last_sync) = state.last_sync else {
        return true;
    };
    if state.devices.is_empty() {
        return true;
    }
    // A sync stamped in the future (clock step) counts as fresh.
    (now - last_sync)
        .to_std()
        .is_ok_and(|age| age > threshold)
}

/// Tick logic, shared by the scheduler task and tests.
pub struct Poller {
    client: Arc<BridgeClient>,
    store: Arc<DeviceStateStore>,
    state: Arc<StateCell>,
    config: Arc<ArcSwap<RuntimeConfig>>,
    in_flight: AtomicBool,
}

/// Resets the in-flight flag however the tick ends, cancellation included.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Poller {
    pub(crate) fn new(
        client: Arc<BridgeClient>,
        store: Arc<DeviceStateStore>,
        state: Arc<StateCell>,
        config: Arc<ArcSwap<RuntimeConfig>>,
    ) -> Self {
        Self {
            client,
            store,
            state,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a tick is running right now.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one poll. Overlapping calls return [`PollOutcome::Skipped`]
    /// without touching the bridge.
    pub async fn tick(&self) -> PollOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("poll already in flight, skipping tick");
            return PollOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        self.refresh_status().await;

        let threshold = self.config.load().stale_threshold();
        if !is_stale(&self.store.snapshot(), threshold, Utc::now()) {
            return PollOutcome::Fresh;
        }

        match sync_discovery(&self.client, &self.store, false).await {
            Ok(count) => {
                self.state.clear_error();
                PollOutcome::Synced { count }
            }
            Err(e) => {
                warn!(error = %e, "poll discovery failed");
                self.state.record_error(&e);
                PollOutcome::Failed
            }
        }
    }

    /// Status failures never abort the tick. A bridge that answers but
    /// reports itself disabled is not an error; an unreachable one is
    /// shown as offline.
    async fn refresh_status(&self) {
        match self.client.status().await {
            Ok(status) => {
                let snapshot = BridgeStatusSnapshot::from(status);
                if let Err(e) = self.store.set_mock_mode(snapshot.mock_mode).await {
                    warn!(error = %e, "failed to persist bridge mode");
                }
                self.state.set_bridge_status(snapshot);
            }
            Err(e) if e.kind() == ErrorKind::Protocol => {
                debug!(error = %e, "bridge status not available");
            }
            Err(e) => {
                debug!(error = %e, "bridge status fetch failed");
                self.state.set_bridge_unreachable(&CoreError::from(e));
            }
        }
    }
}

// ── Scheduler task ───────────────────────────────────────────────────

/// Owner of the poll task.
#[derive(Debug)]
pub struct PollScheduler {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollScheduler {
    /// Spawn the poll loop on `tasks`. The first tick runs immediately.
    pub fn start(poller: Arc<Poller>, cancel: CancellationToken, tasks: &TaskTracker) -> Self {
        let task_cancel = cancel.clone();
        let task = tasks.spawn(poll_loop(poller, task_cancel));
        Self { cancel, task }
    }

    /// Cancel the pending timer and wait for the task to exit. A tick
    /// already in flight finishes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "poll task panicked");
        }
    }
}

async fn poll_loop(poller: Arc<Poller>, cancel: CancellationToken) {
    info!("poll scheduler started");

    while !cancel.is_cancelled() {
        // A started tick always runs to completion so its result is
        // applied and persisted even when the session ends mid-request.
        let outcome = poller.tick().await;
        debug!(?outcome, "poll tick finished");

        // Re-read every round so interval changes apply to the next timer.
        let interval = poller.config.load().effective_poll_interval();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    info!("poll scheduler stopped");
}
