//! Command dispatch and the helpers shared by handlers.

mod command;
mod config_cmd;
mod devices;
mod discover;
mod run;
mod status;

use std::path::PathBuf;

use homebrain_api::BridgeClient;
use homebrain_config::Settings;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;
    tracing::debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Run(args) => run::handle(&args, global).await,
        Command::Status => status::handle(global).await,
        Command::Discover(args) => discover::handle(&args, global).await,
        Command::Devices(args) => devices::handle(&args, global).await,
        Command::Command(args) => command::handle(&args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}

/// Config file in effect: `--config`, else the platform default.
fn settings_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(homebrain_config::config_path)
}

/// Load settings and apply CLI overrides.
fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let mut settings = homebrain_config::load_settings(&settings_path(global))?;
    if let Some(ref url) = global.bridge_url {
        settings.insteon_bridge_url.clone_from(url);
    }
    Ok(settings)
}

/// One-shot client for commands that talk to the bridge directly.
fn bridge_client(settings: &Settings) -> Result<BridgeClient, CliError> {
    let config = settings.to_runtime_config()?;
    Ok(BridgeClient::new(config.bridge_url.clone(), config.transport())?)
}
