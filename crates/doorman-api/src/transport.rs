// Shared resilient transport for every provider client.
//
// Provider clients own an `ApiClient` and only contribute auth headers and
// endpoint shaping. Timeout, retry with exponential backoff, 429 handling
// and rate-limit tracking live here and nowhere else.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::rate_limit::{self, RateLimitInfo, RateLimitState};

const USER_AGENT: &str = concat!("doorman/", env!("CARGO_PKG_VERSION"));

// ── Retry policy ────────────────────────────────────────────────────

/// Bounds for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt for retryable failures (5xx, network).
    pub max_retries: u32,
    /// `delay = base_delay * 2^attempt`.
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
    /// Consecutive 429 waits tolerated before giving up. These waits do not
    /// consume `max_retries`.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_rate_limit_waits: 10,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1` (attempt is zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ── Transport config ────────────────────────────────────────────────

/// Shared transport configuration for building provider clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Applied to every individual call, not to the whole retry loop.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` with the given default headers.
    ///
    /// No reqwest-level timeout is set: the per-call timeout is enforced by
    /// [`ApiClient`] so that it can be classified precisely.
    pub fn build_client(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

/// `Authorization: Bearer <token>` header map with the value marked sensitive.
pub fn bearer_headers(token: &SecretString) -> Result<HeaderMap, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| Error::InvalidToken(format!("invalid header value: {e}")))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

// ── Request ─────────────────────────────────────────────────────────

/// A single logical API call. Re-sent verbatim on retry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a query parameter only when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

// ── Attempt outcome ─────────────────────────────────────────────────

/// Classification of one attempt; drives the retry state machine.
#[derive(Debug)]
enum Outcome {
    Success(String),
    RateLimited(Duration),
    Retryable(Error),
    Fatal(Error),
}

// ── Client ──────────────────────────────────────────────────────────

/// Resilient JSON-over-HTTP client shared by every provider client.
///
/// Owns the per-call timeout, the retry loop and rate-limit tracking.
/// Knows nothing about firewall rules.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
    rate_limit: Mutex<RateLimitState>,
}

impl ApiClient {
    /// Build a client rooted at `base_url` with the given default headers.
    pub fn new(base_url: &str, headers: HeaderMap, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client(headers)?;
        Self::with_client(base_url, http, transport)
    }

    /// Wrap an existing `reqwest::Client` (caller manages default headers).
    pub fn with_client(
        base_url: &str,
        http: reqwest::Client,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            timeout: transport.timeout,
            retry: transport.retry.clone(),
            rate_limit: Mutex::new(RateLimitState::default()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Last rate-limit window reported by the provider.
    pub fn rate_limit(&self) -> RateLimitInfo {
        self.rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info()
    }

    /// Execute a request and deserialize the JSON response.
    ///
    /// An empty success body deserializes as JSON `null`, so `T` may be
    /// `()`, `Option<_>` or `serde_json::Value` for endpoints without content.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        let body = self.execute_raw(request).await?;
        let text = if body.trim().is_empty() { "null" } else { body.as_str() };

        serde_json::from_str(text).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    /// Execute a request and return the raw success body.
    ///
    /// Retry state machine:
    /// - success: return the body;
    /// - 429: sleep until the reported reset, without consuming a retry;
    /// - retryable failure: back off `base_delay * 2^attempt` until
    ///   `max_retries` is exhausted, then return the last error;
    /// - anything else: return immediately.
    pub async fn execute_raw(&self, request: &ApiRequest) -> Result<String, Error> {
        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            match self.attempt(request).await {
                Outcome::Success(body) => {
                    if attempt > 0 {
                        info!(path = request.path(), attempt, "request succeeded after retry");
                    }
                    return Ok(body);
                }
                Outcome::Fatal(err) => return Err(err),
                Outcome::RateLimited(wait) => {
                    if rate_limit_waits >= self.retry.max_rate_limit_waits {
                        warn!(path = request.path(), waits = rate_limit_waits, "rate limit wait budget exhausted");
                        return Err(Error::RateLimited {
                            retry_after_secs: wait.as_secs(),
                            waits: rate_limit_waits,
                        });
                    }
                    rate_limit_waits += 1;
                    info!(
                        path = request.path(),
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        "rate limited, waiting for reset"
                    );
                    tokio::time::sleep(wait).await;
                }
                Outcome::Retryable(err) => {
                    if attempt >= self.retry.max_retries {
                        warn!(path = request.path(), attempts = attempt + 1, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    let delay = self.retry.backoff(attempt);
                    attempt += 1;
                    debug!(
                        path = request.path(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Send the request once and classify the result.
    async fn attempt(&self, request: &ApiRequest) -> Outcome {
        let url = match self.url(request.path()) {
            Ok(url) => url,
            Err(e) => return Outcome::Fatal(e),
        };
        debug!("{} {url}", request.method());

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let call = async {
            let resp = builder.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, headers, body) = match tokio::time::timeout(self.timeout, call).await {
            Err(_elapsed) => {
                return Outcome::Fatal(Error::Timeout {
                    timeout: self.timeout,
                });
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Outcome::Fatal(Error::Timeout {
                    timeout: self.timeout,
                });
            }
            Ok(Err(e)) => {
                let err = Error::Transport(e);
                return if err.is_retryable() {
                    Outcome::Retryable(err)
                } else {
                    Outcome::Fatal(err)
                };
            }
            Ok(Ok(parts)) => parts,
        };

        self.rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(&headers);

        classify(status, &headers, body)
    }

    /// Join a relative path onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

/// Map an HTTP response onto an attempt outcome.
fn classify(status: StatusCode, headers: &HeaderMap, body: String) -> Outcome {
    if status.is_success() {
        return Outcome::Success(body);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset = headers
            .get(rate_limit::HEADER_RESET)
            .and_then(|v| v.to_str().ok());
        return Outcome::RateLimited(rate_limit::wait_for_reset(reset, Utc::now()));
    }

    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .map_or_else(|| status.to_string(), str::to_owned)
    });
    let code = status.as_u16();

    if status.is_server_error() {
        Outcome::Retryable(Error::Server {
            status: code,
            message,
        })
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Outcome::Fatal(Error::Authentication {
            status: code,
            message,
        })
    } else {
        Outcome::Fatal(Error::Api {
            status: code,
            message,
        })
    }
}

/// Extract a human-readable message from an error body.
///
/// Priority: `error` (string, or object with `message`), then `message`,
/// then `errors[]` (strings or objects with `message`, joined by `; `).
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    match value.get("error") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Object(obj)) => {
            if let Some(Value::String(s)) = obj.get("message") {
                return Some(s.clone());
            }
        }
        _ => {}
    }

    if let Some(Value::String(s)) = value.get("message") {
        return Some(s.clone());
    }

    let messages: Vec<String> = value
        .get("errors")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|e| match e {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        })
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

/// Ensure the base URL path ends with `/` so relative joins append.
fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
