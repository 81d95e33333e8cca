// ── Core error types ──
//
// User-facing errors from doorman-core. Transport failures arrive through
// `From<doorman_api::Error>` and are mapped onto domain variants so callers
// never match on HTTP details directly.

use thiserror::Error;

use crate::model::{MutationLog, ProviderKind};
use crate::validate::ValidationIssue;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local validation ─────────────────────────────────────────────
    /// Every violated constraint, never just the first.
    #[error("Configuration is invalid ({} error(s)): {}", .issues.len(), summarize(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    // ── Translation / reconciliation ─────────────────────────────────
    #[error("Rule {rule:?} cannot be expressed on {provider}: {construct}")]
    Translation {
        rule: String,
        construct: String,
        provider: ProviderKind,
    },

    #[error("Reconciliation failed: {message}")]
    Reconciliation { message: String },

    // ── Sync ─────────────────────────────────────────────────────────
    /// Remote state diverges from intent after a sync; local config was
    /// restored to its pre-sync snapshot.
    #[error(
        "Post-sync validation failed, local config restored ({} divergence(s)): {}",
        .divergences.len(),
        .divergences.join("; ")
    )]
    PostSyncValidation { divergences: Vec<String> },

    /// A remote mutation failed; `completed` lists what was already applied.
    #[error("Sync aborted after {} applied mutation(s) [{completed}]: {source}", .completed.len())]
    SyncAborted {
        completed: MutationLog,
        source: Box<CoreError>,
    },

    // ── Provider errors ──────────────────────────────────────────────
    #[error("Operation not supported by {provider}: {operation}")]
    Unsupported {
        operation: String,
        provider: ProviderKind,
    },

    #[error("Provider {provider} is not configured: {missing}")]
    ProviderNotConfigured {
        provider: ProviderKind,
        missing: String,
    },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
        /// Provider error code (Cloudflare envelope code).
        code: Option<i64>,
    },

    // ── Local storage / configuration ────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Config store error: {message}")]
    Store { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Mutations applied before a sync aborted, if this is a sync abort.
    pub fn completed_mutations(&self) -> Option<&MutationLog> {
        match self {
            Self::SyncAborted { completed, .. } => Some(completed),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<doorman_api::Error> for CoreError {
    fn from(err: doorman_api::Error) -> Self {
        use doorman_api::Error as ApiError;

        match err {
            ApiError::Authentication { status, message } => CoreError::AuthenticationFailed {
                message: format!("{message} (HTTP {status})"),
            },
            ApiError::InvalidToken(message) => CoreError::AuthenticationFailed { message },
            ApiError::Timeout { timeout } => CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            },
            ApiError::RateLimited {
                retry_after_secs,
                waits,
            } => CoreError::Api {
                message: format!(
                    "Rate limited after {waits} waits -- retry after {retry_after_secs}s"
                ),
                status: Some(429),
                code: None,
            },
            ApiError::Api { status, message } | ApiError::Server { status, message } => {
                CoreError::Api {
                    message,
                    status: Some(status),
                    code: None,
                }
            }
            ApiError::Cloudflare { code, message } => CoreError::Api {
                message,
                status: None,
                code,
            },
            ApiError::Transport(e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
                code: None,
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Client(message) => CoreError::Config { message },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{EntityKind, MutationKind};
    use crate::validate::Severity;

    #[test]
    fn api_errors_map_to_domain_variants() {
        let err: CoreError = doorman_api::Error::Timeout {
            timeout: Duration::from_secs(30),
        }
        .into();
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 30 }));

        let err: CoreError = doorman_api::Error::Api {
            status: 400,
            message: "bad rule".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(400), .. }));
    }

    #[test]
    fn validation_error_lists_every_issue() {
        let err = CoreError::Validation {
            issues: vec![
                ValidationIssue::new("rules[0].name", "must not be empty", Severity::Error),
                ValidationIssue::new("ips[1].ip", "invalid address", Severity::Error),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("rules[0].name"));
        assert!(text.contains("ips[1].ip"));
    }

    #[test]
    fn sync_aborted_reports_completed_mutations() {
        let mut log = MutationLog::default();
        log.record(MutationKind::Add, EntityKind::Rule, Some("r1".into()), "A");
        let err = CoreError::SyncAborted {
            completed: log,
            source: Box::new(CoreError::Timeout { timeout_secs: 5 }),
        };
        assert_eq!(err.completed_mutations().map(MutationLog::len), Some(1));
        assert!(err.to_string().contains("1 applied mutation(s)"));
    }
}
