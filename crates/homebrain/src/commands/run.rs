//! `homebrain run`: the long-running sync daemon.
//!
//! Starts the runtime, logs a status line on an interval, reloads
//! settings on SIGHUP and shuts down cleanly on Ctrl-C or SIGTERM.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use homebrain_core::{DeviceStateStore, RuntimeController, RuntimeStatus};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let config = settings.to_runtime_config()?;
    let cache_path = settings.cache_path();

    let store = Arc::new(DeviceStateStore::open(&cache_path).await);
    info!(
        path = %cache_path.display(),
        devices = store.len(),
        "device cache loaded"
    );

    let controller = RuntimeController::new(config, store);
    controller.start().await?;
    if !controller.is_running() {
        warn!("Insteon runtime is disabled; set insteon_enabled and send SIGHUP to start it");
    }

    let mut hangup = Listener::hangup()?;
    let mut terminate = Listener::terminate()?;
    let mut status_timer = status_timer(args.status_interval);
    let mut states = controller.subscribe();
    let mut last_error = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("interrupt received, shutting down");
                break;
            }
            () = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            () = hangup.recv() => reload(&controller, global, &cache_path).await,
            () = tick(&mut status_timer) => log_status(&controller.status()),
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = states.borrow_and_update().last_error.clone();
                let message = current.as_ref().map(|e| e.message.clone());
                if message != last_error {
                    if let Some(e) = current {
                        warn!(error = %e.message, status = e.status, "bridge error");
                    }
                    last_error = message;
                }
            }
        }
    }

    controller.shutdown().await;
    info!(devices = controller.store().len(), "runtime stopped");
    Ok(())
}

/// Re-read settings and hand them to the runtime. Failures keep the
/// current configuration.
async fn reload(controller: &RuntimeController, global: &GlobalOpts, cache_path: &Path) {
    info!("SIGHUP received, reloading settings");
    let settings = match super::load_settings(global) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "settings reload failed, keeping current configuration");
            return;
        }
    };
    if settings.cache_path() != cache_path {
        warn!(
            current = %cache_path.display(),
            "device_cache_path changes take effect on restart"
        );
    }

    let result = match settings.to_runtime_config() {
        Ok(config) => controller.apply_config(config).await.map_err(CliError::from),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => info!(running = controller.is_running(), "settings applied"),
        Err(e) => warn!(error = %e, "settings reload failed, keeping current configuration"),
    }
}

fn log_status(status: &RuntimeStatus) {
    info!(
        running = status.running,
        bridge = %status.bridge_url,
        online = status.bridge_status.as_ref().map(|b| b.online),
        stream = %status.stream,
        devices = status.device_count,
        mock = status.mock_mode,
        last_sync = ?status.last_sync,
        last_error = status.last_error.as_ref().map(|e| e.message.as_str()),
        "runtime status"
    );
}

// ── Timers & signals ────────────────────────────────────────────────

fn status_timer(secs: u64) -> Option<Interval> {
    (secs > 0).then(|| {
        let period = Duration::from_secs(secs);
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    })
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// One OS signal as an awaitable stream. Resolves never on platforms
/// without it.
#[cfg(unix)]
struct Listener(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Listener {
    fn hangup() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    fn terminate() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::terminate())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Listener;

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
impl Listener {
    fn hangup() -> std::io::Result<Self> {
        Ok(Self)
    }

    fn terminate() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
