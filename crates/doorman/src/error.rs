//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use doorman_config::ConfigError;
use doorman_core::{CoreError, ProviderKind};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const INVALID_CONFIG: i32 = 4;
    pub const NOT_CONFIGURED: i32 = 5;
    pub const SYNC_FAILED: i32 = 6;
    pub const UNSUPPORTED: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Local config ─────────────────────────────────────────────────
    #[error("Config file not found: {path}")]
    #[diagnostic(
        code(doorman::no_config),
        help(
            "Create it, pass --config, or set DOORMAN_CONFIG.\n\
             Try: doorman pull --write"
        )
    )]
    NoConfig { path: String },

    #[error("{message}")]
    #[diagnostic(code(doorman::bad_config), help("Fix the JSON in {path} and try again."))]
    BadConfig { path: String, message: String },

    #[error("Config has {count} error(s)")]
    #[diagnostic(code(doorman::invalid), help("{details}"))]
    Invalid { count: usize, details: String },

    // ── Provider ─────────────────────────────────────────────────────
    #[error("{provider} is not configured: missing {missing}")]
    #[diagnostic(
        code(doorman::not_configured),
        help("Set the environment variables or store a token with: doorman login {provider}")
    )]
    NotConfigured {
        provider: ProviderKind,
        missing: String,
    },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(doorman::auth_failed),
        help("Check the provider token (VERCEL_TOKEN / CLOUDFLARE_API_TOKEN) or run: doorman login")
    )]
    AuthFailed { message: String },

    #[error("{operation} is not supported by {provider}")]
    #[diagnostic(code(doorman::unsupported))]
    Unsupported {
        operation: String,
        provider: ProviderKind,
    },

    #[error("Rule {rule:?} cannot be expressed on {provider}: {construct}")]
    #[diagnostic(
        code(doorman::translation),
        help("Run: doorman compat --from <provider> --to {provider}")
    )]
    Translation {
        rule: String,
        construct: String,
        provider: ProviderKind,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(doorman::timeout),
        help("Increase DOORMAN_TIMEOUT or retry later.")
    )]
    Timeout { seconds: u64 },

    #[error("API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(doorman::api_error))]
    Api { message: String, status: Option<u16> },

    // ── Sync ─────────────────────────────────────────────────────────
    #[error("Remote does not match the config after sync; local config restored")]
    #[diagnostic(
        code(doorman::post_sync),
        help("Divergences:\n{details}\nInspect the remote with: doorman pull")
    )]
    PostSync { details: String },

    #[error("Sync aborted: {reason}")]
    #[diagnostic(
        code(doorman::sync_aborted),
        help("Already applied on the remote:\n{applied}\nRun doorman plan to see what is left.")
    )]
    SyncAborted { reason: String, applied: String },

    // ── Usage / IO ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(doorman::validation))]
    Validation { field: String, reason: String },

    #[error("Confirmation required to {action}")]
    #[diagnostic(
        code(doorman::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    #[error(transparent)]
    #[diagnostic(code(doorman::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(doorman::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NoConfig { .. } | Self::BadConfig { .. } | Self::Invalid { .. } => {
                exit_code::INVALID_CONFIG
            }
            Self::NotConfigured { .. } | Self::Config(_) => exit_code::NOT_CONFIGURED,
            Self::PostSync { .. } | Self::SyncAborted { .. } => exit_code::SYNC_FAILED,
            Self::Unsupported { .. } | Self::Translation { .. } => exit_code::UNSUPPORTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

fn bullets(lines: impl IntoIterator<Item = String>) -> String {
    lines
        .into_iter()
        .map(|line| format!("  - {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { issues } => CliError::Invalid {
                count: issues.len(),
                details: bullets(issues.iter().map(ToString::to_string)),
            },
            CoreError::Translation {
                rule,
                construct,
                provider,
            } => CliError::Translation {
                rule,
                construct,
                provider,
            },
            CoreError::PostSyncValidation { divergences } => CliError::PostSync {
                details: bullets(divergences),
            },
            CoreError::SyncAborted { completed, source } => CliError::SyncAborted {
                reason: source.to_string(),
                applied: if completed.is_empty() {
                    "  (nothing)".into()
                } else {
                    bullets(completed.entries().iter().map(ToString::to_string))
                },
            },
            CoreError::Unsupported {
                operation,
                provider,
            } => CliError::Unsupported {
                operation,
                provider,
            },
            CoreError::ProviderNotConfigured { provider, missing } => {
                CliError::NotConfigured { provider, missing }
            }
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Api {
                message, status, ..
            } => CliError::Api { message, status },
            CoreError::Config { message } | CoreError::Store { message } => CliError::BadConfig {
                path: "the config file".into(),
                message,
            },
            CoreError::Reconciliation { message } | CoreError::Internal(message) => {
                CliError::Internal(message)
            }
        }
    }
}
