use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `doorman-api` crate.
///
/// Covers every failure mode of the shared transport and both provider
/// clients. `doorman-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token rejected (HTTP 401/403).
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// The token could not be encoded as a header value.
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The call exceeded its timeout and was aborted.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Building the underlying HTTP client failed.
    #[error("HTTP client error: {0}")]
    Client(String),

    // ── Rate limiting ───────────────────────────────────────────────
    /// Still rate limited after the allowed number of waits.
    #[error("Rate limited -- gave up after {waits} waits (next reset in {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64, waits: u32 },

    // ── HTTP status ─────────────────────────────────────────────────
    /// Client error (4xx other than 401/403/429). Never retried.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Server error (5xx). Retried by the transport.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Cloudflare returned `success: false` inside its envelope.
    #[error("Cloudflare API error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Cloudflare { code: Option<i64>, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Request body could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the transport may retry this error.
    ///
    /// Timeouts are deliberately excluded: an aborted call is surfaced
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_timeout() && !e.is_builder() && !e.is_decode(),
            Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Api { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
