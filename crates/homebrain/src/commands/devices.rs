//! `homebrain devices`: read the persisted device cache.

use homebrain_core::{DeviceSnapshot, DeviceStateStore, normalize_id};
use serde_json::Value;
use tabled::Tabled;

use crate::cli::{DevicesArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(super) struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Level")]
    level: String,
}

impl DeviceRow {
    fn new(d: &DeviceSnapshot) -> Self {
        Self {
            id: d.id.clone(),
            address: d.address().unwrap_or_default(),
            name: d.name().unwrap_or_default().to_owned(),
            category: d.get("category").map(text).unwrap_or_default(),
            level: d
                .get("level")
                .or_else(|| d.get("state"))
                .map(text)
                .unwrap_or_default(),
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn detail(d: &DeviceSnapshot) -> String {
    let mut pairs = vec![
        ("ID".to_owned(), d.id.clone()),
        ("Address".to_owned(), d.address().unwrap_or_else(|| "-".into())),
    ];
    for (key, value) in d.attributes.iter().filter(|(key, _)| *key != "address") {
        pairs.push((key.clone(), text(value)));
    }
    output::key_values(&pairs)
}

pub(super) fn render_devices(
    format: OutputFormat,
    devices: &[DeviceSnapshot],
) -> Result<String, CliError> {
    output::render_list(format, devices, DeviceRow::new, |d| d.id.clone())
}

pub async fn handle(args: &DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let store = DeviceStateStore::open(settings.cache_path()).await;

    let out = match args.device {
        Some(ref raw) => {
            let device = normalize_id(raw)
                .and_then(|id| store.device(&id))
                .ok_or_else(|| CliError::NotFound {
                    identifier: raw.clone(),
                })?;
            output::render_single(global.output, &device, detail, |d| d.id.clone())?
        }
        None => {
            let out = render_devices(global.output, &store.devices())?;
            if matches!(global.output, OutputFormat::Table) {
                format!("{out}\n{}", sync_footer(&store, global))
            } else {
                out
            }
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}

fn sync_footer(store: &DeviceStateStore, global: &GlobalOpts) -> String {
    let state = store.snapshot();
    let line = match state.last_sync_summary {
        Some(ref summary) => format!(
            "{} devices, last sync {} via {} ({} mode)",
            state.devices.len(),
            summary.timestamp.to_rfc3339(),
            summary.source,
            summary.mode,
        ),
        None => format!("{} devices, never synced", state.devices.len()),
    };
    output::dimmed(&line, output::should_color(global.color))
}
