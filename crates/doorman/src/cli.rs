//! Clap derive structures for the `doorman` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use doorman_core::ProviderKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// doorman -- one firewall config for Vercel and Cloudflare
#[derive(Debug, Parser)]
#[command(
    name = "doorman",
    version,
    about = "Keep Vercel and Cloudflare firewall rules in sync with a local JSON config",
    long_about = "Plan, apply and inspect firewall rules from a provider-agnostic\n\
        doorman.json. Rules are translated to each provider's native schema,\n\
        diffed against the remote and applied in delete, add, update order.",
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
    /// Local config file [default: $DOORMAN_CONFIG or ./doorman.json]
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Target provider (skips detection)
    #[arg(long, short = 'p', global = true, value_parser = parse_provider)]
    pub provider: Option<ProviderKind>,

    /// Output format
    #[arg(long, short = 'o', default_value = "text", global = true)]
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value
        .parse()
        .map_err(|_| format!("unknown provider '{value}' (expected vercel or cloudflare)"))
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the remote changes a sync would make
    Plan,

    /// Apply the local config to the provider
    Sync(SyncArgs),

    /// Check the local config without contacting a provider
    #[command(alias = "check")]
    Validate,

    /// Score the local config and suggest improvements
    Health,

    /// Show which provider would be targeted and why
    Detect,

    /// Fetch the remote rules as a local config
    Pull(PullArgs),

    /// Compare feature support between two providers
    Compat(CompatArgs),

    /// Convert the local config for another provider
    Migrate(MigrateArgs),

    /// Store a provider token in the system keyring
    Login(LoginArgs),

    /// Remove a provider token from the system keyring
    Logout(LoginArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Compute changes without calling mutating endpoints
    #[arg(long)]
    pub dry_run: bool,

    /// Rewrite local ids to the ids the provider assigned
    #[arg(long)]
    pub repair_ids: bool,
}

#[derive(Debug, Args)]
pub struct PullArgs {
    /// Fetch a specific historical version (Vercel only)
    #[arg(long)]
    pub version: Option<u64>,

    /// Write the fetched config to the config file instead of printing it
    #[arg(long)]
    pub write: bool,
}

#[derive(Debug, Args)]
pub struct CompatArgs {
    /// Provider the rules are written for
    #[arg(long, value_parser = parse_provider)]
    pub from: ProviderKind,

    /// Provider the rules would move to
    #[arg(long, value_parser = parse_provider)]
    pub to: ProviderKind,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Target provider
    #[arg(long, value_parser = parse_provider)]
    pub to: ProviderKind,

    /// Write the migrated config here instead of printing it
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Provider the token belongs to
    #[arg(value_parser = parse_provider)]
    pub provider: ProviderKind,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
