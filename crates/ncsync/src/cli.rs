//! Clap derive structures for the `ncsync` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so this file may
//! only depend on `clap` and `clap_complete`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ncsync -- bulk device sync checks against orchestrator management APIs
#[derive(Debug, Parser)]
#[command(
    name = "ncsync",
    version,
    about = "Check device configuration sync across management-API targets",
    long_about = "Reaches each target's management API directly or through an SSH\n\
        tunnel, lists its device inventory, and runs a bounded-concurrency\n\
        check-sync over every device.",
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
    #[arg(long, env = "NCSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Reachability mode (overrides `defaults.mode`)
    #[arg(long, short = 'm', env = "NCSYNC_MODE", global = true)]
    pub mode: Option<ModeArg>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NCSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Per-request timeout in seconds (overrides `defaults.request_timeout`)
    #[arg(long, env = "NCSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Direct when the hostname matches `defaults.direct_hostname`
    Auto,
    /// Always connect straight to the target
    Direct,
    /// Always go through the SSH intermediary
    Tunneled,
}

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// List configured targets
    #[command(alias = "ls")]
    Targets(TargetsArgs),

    /// Bring up the tunnel for a target (no-op for direct targets)
    #[command(alias = "up")]
    Connect(TargetArg),

    /// Tear down the tunnel for a target
    #[command(alias = "down")]
    Disconnect(TargetArg),

    /// Show tunnel state for one or all targets
    Status(StatusArgs),

    /// List the device inventory of a target
    #[command(alias = "inventory")]
    Devices(TargetArg),

    /// Verify the management API answers
    Test(TargetArg),

    /// Check sync status of every device on a target
    Check(CheckArgs),

    /// Manage CLI configuration and stored passwords
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TargetArg {
    /// Target identifier from the config file
    pub target: String,
}

#[derive(Debug, Args)]
pub struct TargetsArgs {
    /// Only targets with this environment label
    #[arg(long, short = 'e')]
    pub environment: Option<String>,

    /// Only targets with this platform label
    #[arg(long, short = 'p')]
    pub platform: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Target identifier (all targets when omitted)
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Target identifier from the config file
    pub target: String,

    /// Concurrent check-sync requests (overrides `defaults.concurrency`)
    #[arg(long, short = 'j', value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Don't draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration (passwords redacted)
    Show,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file without asking
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Store a target's API password in the system keyring
    SetPassword {
        /// Target identifier from the config file
        target: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
