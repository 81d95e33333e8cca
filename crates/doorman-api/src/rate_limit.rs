// Rate-limit header tracking.
//
// Both providers report `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
// `X-RateLimit-Reset` (epoch seconds). The transport feeds every response
// through `RateLimitState::observe` and asks `wait_for_reset` how long to
// sleep after a 429.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::warn;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Wait used when a 429 carries no usable reset header.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Lower bound on any rate-limit wait.
pub const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Remaining-capacity threshold below which a warning is logged.
pub const LOW_REMAINING_THRESHOLD: u64 = 10;

/// Last observed rate-limit window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Mutable tracker shared across calls of one client.
#[derive(Debug, Default)]
pub(crate) struct RateLimitState {
    info: RateLimitInfo,
    low_warned: bool,
}

impl RateLimitState {
    /// Record the rate-limit headers of a response.
    ///
    /// Logs once when remaining capacity drops below
    /// [`LOW_REMAINING_THRESHOLD`]; the warning re-arms after recovery.
    pub(crate) fn observe(&mut self, headers: &HeaderMap) {
        let limit = header_u64(headers, HEADER_LIMIT);
        let remaining = header_u64(headers, HEADER_REMAINING);
        let reset_at = header_i64(headers, HEADER_RESET).and_then(|s| DateTime::from_timestamp(s, 0));

        if limit.is_none() && remaining.is_none() && reset_at.is_none() {
            return;
        }

        self.info = RateLimitInfo {
            limit: limit.or(self.info.limit),
            remaining,
            reset_at: reset_at.or(self.info.reset_at),
        };

        match remaining {
            Some(left) if left < LOW_REMAINING_THRESHOLD => {
                if !self.low_warned {
                    warn!(
                        remaining = left,
                        limit = ?self.info.limit,
                        reset_at = ?self.info.reset_at,
                        "API rate limit nearly exhausted"
                    );
                    self.low_warned = true;
                }
            }
            Some(_) => self.low_warned = false,
            None => {}
        }
    }

    pub(crate) fn info(&self) -> RateLimitInfo {
        self.info
    }
}

/// How long to wait after a 429, given the raw `X-RateLimit-Reset` value.
///
/// `delay = reset - now`, clamped to [`MIN_RATE_LIMIT_WAIT`]; a missing or
/// unparseable header yields [`DEFAULT_RATE_LIMIT_WAIT`].
pub fn wait_for_reset(reset: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(reset_secs) = reset.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return DEFAULT_RATE_LIMIT_WAIT;
    };

    let delta_ms = reset_secs
        .saturating_mul(1000)
        .saturating_sub(now.timestamp_millis());

    u64::try_from(delta_ms)
        .map(Duration::from_millis)
        .unwrap_or(MIN_RATE_LIMIT_WAIT)
        .max(MIN_RATE_LIMIT_WAIT)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn wait_uses_reset_header() {
        let now = at(1_700_000_000);
        let wait = wait_for_reset(Some("1700000002"), now);
        assert_eq!(wait, Duration::from_secs(2));
    }

    #[test]
    fn wait_is_clamped_to_one_second() {
        let now = at(1_700_000_000);
        assert_eq!(wait_for_reset(Some("1699999990"), now), MIN_RATE_LIMIT_WAIT);
        assert_eq!(wait_for_reset(Some("1700000000"), now), MIN_RATE_LIMIT_WAIT);
    }

    #[test]
    fn wait_defaults_without_header() {
        let now = at(1_700_000_000);
        assert_eq!(wait_for_reset(None, now), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(wait_for_reset(Some("soon"), now), DEFAULT_RATE_LIMIT_WAIT);
    }

    #[test]
    fn observe_tracks_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_LIMIT, HeaderValue::from_static("100"));
        headers.insert(HEADER_REMAINING, HeaderValue::from_static("42"));
        headers.insert(HEADER_RESET, HeaderValue::from_static("1700000000"));

        let mut state = RateLimitState::default();
        state.observe(&headers);

        let info = state.info();
        assert_eq!(info.limit, Some(100));
        assert_eq!(info.remaining, Some(42));
        assert_eq!(info.reset_at, Some(at(1_700_000_000)));
        assert!(!state.low_warned);
    }

    #[test]
    fn low_capacity_warning_fires_once_and_rearms() {
        let mut low = HeaderMap::new();
        low.insert(HEADER_REMAINING, HeaderValue::from_static("3"));
        let mut high = HeaderMap::new();
        high.insert(HEADER_REMAINING, HeaderValue::from_static("50"));

        let mut state = RateLimitState::default();
        state.observe(&low);
        assert!(state.low_warned);
        state.observe(&low);
        assert!(state.low_warned);
        state.observe(&high);
        assert!(!state.low_warned);
    }

    #[test]
    fn responses_without_headers_keep_previous_info() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_REMAINING, HeaderValue::from_static("7"));
        let mut state = RateLimitState::default();
        state.observe(&headers);
        state.observe(&HeaderMap::new());
        assert_eq!(state.info().remaining, Some(7));
    }
}
