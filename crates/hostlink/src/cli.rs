//! Clap derive structures for the `hostlink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hostlink -- replay host discovery and stream telemetry logs
#[derive(Debug, Parser)]
#[command(
    name = "hostlink",
    version,
    about = "Reconcile host discovery logs and summarize stream telemetry",
    long_about = "Diagnostics for streaming-host discovery.\n\n\
        Replays captured discovery observations through the host registry\n\
        and telemetry samples through the windowed aggregator.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HOSTLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to `defaults.output` from the config file)
    #[arg(long, short = 'o', env = "HOSTLINK_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
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

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay discovery observations through the host registry
    #[command(alias = "h")]
    Hosts(HostsArgs),

    /// Replay telemetry samples through the windowed aggregator
    Stats(StatsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Hosts ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HostsArgs {
    #[command(subcommand)]
    pub command: HostsCommand,
}

#[derive(Debug, Subcommand)]
pub enum HostsCommand {
    /// Merge a JSON array of observations and print the canonical hosts
    Replay {
        /// JSON file holding an array of raw observations
        file: PathBuf,
    },

    /// Merge observations, then print each host's connection address
    Route {
        /// JSON file holding an array of raw observations
        file: PathBuf,

        /// Only show this host (id)
        #[arg(long)]
        host: Option<String>,
    },
}

// ── Stats ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub command: StatsCommand,
}

#[derive(Debug, Subcommand)]
pub enum StatsCommand {
    /// Fold a JSON array of samples and print the session summary
    Replay {
        /// JSON file holding an array of telemetry samples
        file: PathBuf,

        /// Window length in milliseconds (overrides telemetry.window_ms)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Decoder name to record in the summary
        #[arg(long)]
        decoder: Option<String>,

        /// Average network latency reported for the session, in ms
        #[arg(long)]
        net_latency_ms: Option<u32>,

        /// Network latency variance reported for the session, in ms
        #[arg(long)]
        net_latency_variance_ms: Option<u32>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
