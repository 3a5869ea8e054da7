//! `homebrain command`: dispatch a device command through the bridge.

use homebrain_api::CommandRequest;
use homebrain_core::normalize_id;

use crate::cli::{CommandArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Build the request body from CLI arguments. `fast_on`/`fast_off` are
/// bridge verbs of their own and pass through unchanged.
pub(super) fn build_request(args: &CommandArgs) -> Result<CommandRequest, CliError> {
    let command = args.command.trim().to_ascii_lowercase();
    if command.is_empty() {
        return Err(CliError::Validation {
            field: "command".into(),
            reason: "must not be empty".into(),
        });
    }

    let mut request = CommandRequest::new(command).with_fast(args.fast);
    if let Some(level) = args.level {
        request = request.with_level(level);
    }
    if let Some(duration) = args.duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(CliError::Validation {
                field: "duration".into(),
                reason: format!("expected a non-negative number of seconds, got {duration}"),
            });
        }
        request = request.with_duration(duration);
    }
    Ok(request)
}

pub async fn handle(args: &CommandArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device_id = normalize_id(&args.device).ok_or_else(|| CliError::Validation {
        field: "device".into(),
        reason: format!("'{}' is not an Insteon address", args.device),
    })?;
    let request = build_request(args)?;

    let settings = super::load_settings(global)?;
    let client = super::bridge_client(&settings)?;
    let result = client.send_command(&device_id, &request).await?;

    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            format!("{} sent to {device_id}", request.command)
        }
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
        OutputFormat::JsonCompact => serde_json::to_string(&result)?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
