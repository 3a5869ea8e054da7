//! `homebrain discover`: one-shot discovery, optionally saved to the cache.

use homebrain_core::{DeviceSnapshot, DeviceStateStore, SyncSource, SyncSummary};
use tracing::info;

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let client = super::bridge_client(&settings)?;
    let discovery = client.discovery(args.refresh).await?;
    info!(
        devices = discovery.devices.len(),
        mock = discovery.is_mock(),
        "discovery received"
    );

    let devices = if args.save {
        let store = DeviceStateStore::open(settings.cache_path()).await;
        let reported = discovery.count.unwrap_or(discovery.devices.len());
        let summary = SyncSummary::new(SyncSource::Http, discovery.mode.as_deref(), reported);
        store.replace_all(discovery.devices, summary).await?;
        info!(count = store.len(), path = %settings.cache_path().display(), "device cache replaced");
        store.devices()
    } else {
        discovery
            .devices
            .into_iter()
            .filter_map(DeviceSnapshot::from_raw)
            .collect()
    };

    let out = super::devices::render_devices(global.output, &devices)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
