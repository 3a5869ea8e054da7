//! Insteon bridge synchronization engine between `homebrain-api` and its
//! consumers (the HTTP layer, the `homebrain` CLI).
//!
//! - **[`RuntimeController`]**: lifecycle owner. Starts and stops the poll
//!   scheduler and the event stream as configuration changes, caches the
//!   [`BridgeClient`](homebrain_api::BridgeClient), and serves a read path
//!   ([`RuntimeController::status`]) that never touches the network.
//!
//! - **[`DeviceStateStore`]**: the authoritative device map plus last-sync
//!   metadata. Mutations are serialized through a `tokio::sync::watch`
//!   channel and persisted with write-temp-then-rename.
//!
//! - **[`PollScheduler`]**: fallback discovery when the store goes stale,
//!   with an in-flight guard against overlapping ticks.
//!
//! - **Domain model** ([`model`]): [`DeviceSnapshot`] keyed by a
//!   [normalized](normalize_id) Insteon address, [`SyncSummary`],
//!   [`BridgeStatusSnapshot`] and [`LastError`].

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod poller;
pub mod state;
pub mod store;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::RuntimeConfig;
pub use controller::RuntimeController;
pub use error::CoreError;
pub use model::{
    BridgeStatusSnapshot, DeviceSnapshot, LastError, SyncSource, SyncSummary, normalize_id,
};
pub use poller::{PollOutcome, PollScheduler, is_stale};
pub use state::{RuntimeState, RuntimeStatus, StreamStatus};
pub use store::{DeviceStateStore, StoreState};
