//! Clap derive structures for the `homebrain` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// homebrain -- Insteon bridge synchronization runtime
#[derive(Debug, Parser)]
#[command(
    name = "homebrain",
    version,
    about = "Keep a local Insteon device cache in sync with the HomeBrain bridge",
    long_about = "Runs the Insteon synchronization runtime (event stream plus fallback\n\
        polling) and offers one-shot bridge operations for inspection.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file
    #[arg(long, env = "HOMEBRAIN_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Bridge URL (overrides the config file)
    #[arg(long, short = 'b', global = true)]
    pub bridge_url: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the synchronization runtime until interrupted
    Run(RunArgs),

    /// Show the bridge status
    Status,

    /// Ask the bridge for its device list
    #[command(alias = "disc")]
    Discover(DiscoverArgs),

    /// Show devices from the local cache (no bridge contact)
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Send a command to a device
    #[command(alias = "cmd")]
    Command(CommandArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between status log lines (0 disables them)
    #[arg(long, default_value = "60")]
    pub status_interval: u64,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Ask the bridge to rescan its modem instead of returning its cache
    #[arg(long)]
    pub refresh: bool,

    /// Replace the local device cache with the result
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Show a single device (any address notation)
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct CommandArgs {
    /// Device id or address (e.g. 4A.BC.01)
    pub device: String,

    /// Command: on, off, fast_on, fast_off, status, or any bridge verb
    pub command: String,

    /// Level as 0-100 percent or a raw 0-255 value
    #[arg(long, short = 'l')]
    pub level: Option<u8>,

    /// Use the fast (instant) variant
    #[arg(long)]
    pub fast: bool,

    /// Ramp duration in seconds
    #[arg(long)]
    pub duration: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings (secrets masked)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init,
}
