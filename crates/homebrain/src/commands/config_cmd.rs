//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = super::settings_path(global);

    let out = match args.command {
        ConfigCommand::Path => path.display().to_string(),
        ConfigCommand::Init => {
            homebrain_config::write_default(&path)?;
            format!("wrote {}", path.display())
        }
        ConfigCommand::Show => {
            let settings = super::load_settings(global)?;
            let entries = settings.masked_entries();
            match global.output {
                OutputFormat::Table | OutputFormat::Plain => output::key_values(&entries),
                OutputFormat::Json | OutputFormat::JsonCompact => {
                    let map: serde_json::Map<String, serde_json::Value> = entries
                        .into_iter()
                        .map(|(k, v)| (k.to_owned(), v.into()))
                        .collect();
                    if matches!(global.output, OutputFormat::Json) {
                        serde_json::to_string_pretty(&map)?
                    } else {
                        serde_json::to_string(&map)?
                    }
                }
            }
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
