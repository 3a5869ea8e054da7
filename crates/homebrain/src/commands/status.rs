//! `homebrain status`: one-shot bridge health check.

use homebrain_core::BridgeStatusSnapshot;
use serde_json::Value;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let client = super::bridge_client(&settings)?;
    let snapshot = BridgeStatusSnapshot::from(client.status().await?);

    let color = output::should_color(global.color);
    let url = client.base_url().to_string();
    let out = output::render_single(
        global.output,
        &snapshot,
        |s| detail(s, &url, color),
        |s| output::online_label(s.online, false),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(s: &BridgeStatusSnapshot, url: &str, color: bool) -> String {
    let mut pairs = vec![
        ("Bridge".to_owned(), url.to_owned()),
        ("State".to_owned(), output::online_label(s.online, color)),
        (
            "Mode".to_owned(),
            s.mode.clone().unwrap_or_else(|| output::dimmed("-", color)),
        ),
        ("Mock".to_owned(), s.mock_mode.to_string()),
    ];
    if let Some(ref error) = s.error {
        pairs.push(("Error".to_owned(), error.clone()));
    }
    pairs.push(("Fetched".to_owned(), s.fetched_at.to_rfc3339()));

    for (key, value) in &s.details {
        let shown = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        pairs.push((key.clone(), shown));
    }
    output::key_values(&pairs)
}
