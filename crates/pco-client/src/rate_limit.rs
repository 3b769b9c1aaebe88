//! Rate-limit bookkeeping from response headers.
//!
//! Planning Center reports throttling state through four headers:
//!
//! | Header | Meaning |
//! |---|---|
//! | `Retry-After` | seconds to wait before the next request |
//! | `X-PCO-API-Request-Rate-Count` | requests made in the current period |
//! | `X-PCO-API-Request-Rate-Limit` | requests allowed per period |
//! | `X-PCO-API-Request-Rate-Period` | period length in seconds |
//!
//! A header that is absent or malformed leaves the corresponding snapshot
//! field untouched.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;

pub const RETRY_AFTER: &str = "retry-after";
pub const RATE_COUNT: &str = "x-pco-api-request-rate-count";
pub const RATE_LIMIT: &str = "x-pco-api-request-rate-limit";
pub const RATE_PERIOD: &str = "x-pco-api-request-rate-period";

/// Last known throttling state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitSnapshot {
    /// Requests made in the current period.
    pub count: Option<u32>,
    /// Requests allowed per period.
    pub limit: Option<u32>,
    /// Length of the rate-limit window.
    pub period: Option<Duration>,
    /// Most recent `Retry-After` hint.
    pub retry_after: Option<Duration>,
    /// When any field was last replaced.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RateLimitSnapshot {
    /// Requests left in the current period, when both count and limit are known.
    pub fn remaining(&self) -> Option<u32> {
        match (self.limit, self.count) {
            (Some(limit), Some(count)) => Some(limit.saturating_sub(count)),
            _ => None,
        }
    }

    /// Returns true if the last response reported no remaining requests.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }
}

/// Rate-limit fields parsed from a single response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub count: Option<u32>,
    pub limit: Option<u32>,
    pub period: Option<Duration>,
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse the rate-limit headers. Never fails.
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            count: header_str(headers, RATE_COUNT).and_then(|v| v.parse().ok()),
            limit: header_str(headers, RATE_LIMIT).and_then(|v| v.parse().ok()),
            period: header_str(headers, RATE_PERIOD).and_then(parse_seconds),
            retry_after: header_str(headers, RETRY_AFTER).and_then(parse_seconds),
        }
    }

    /// Returns true if no rate-limit header was present and well-formed.
    pub fn is_empty(&self) -> bool {
        self.count.is_none()
            && self.limit.is_none()
            && self.period.is_none()
            && self.retry_after.is_none()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// Parse a non-negative number of seconds. HTTP-date values are treated as absent.
fn parse_seconds(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Shared, client-scoped rate-limit state.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    snapshot: RwLock<RateLimitSnapshot>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the rate-limit headers of one response into the snapshot.
    ///
    /// All present fields are applied under a single write lock, so readers
    /// never observe half of a response's update.
    pub fn observe(&self, headers: &HeaderMap) -> RateLimitHeaders {
        let parsed = RateLimitHeaders::parse(headers);
        self.apply(parsed);
        parsed
    }

    /// Merge already-parsed fields into the snapshot.
    pub fn apply(&self, parsed: RateLimitHeaders) {
        if parsed.is_empty() {
            return;
        }

        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = parsed.count {
            snapshot.count = Some(count);
        }
        if let Some(limit) = parsed.limit {
            snapshot.limit = Some(limit);
        }
        if let Some(period) = parsed.period {
            snapshot.period = Some(period);
        }
        if let Some(retry_after) = parsed.retry_after {
            snapshot.retry_after = Some(retry_after);
        }
        snapshot.updated_at = Some(Utc::now());
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How long to hold off before sending, if the last response said the
    /// window is used up.
    pub fn advised_backoff(&self) -> Option<Duration> {
        let snapshot = self.snapshot();
        if !snapshot.is_exhausted() {
            return None;
        }
        snapshot.retry_after.or(snapshot.period)
    }

    /// What is left of [`advised_backoff`](Self::advised_backoff), counted
    /// from when the snapshot was last updated.
    pub fn throttle_delay(&self) -> Option<Duration> {
        let backoff = self.advised_backoff()?;
        let updated_at = self.snapshot().updated_at?;
        let elapsed = (Utc::now() - updated_at).to_std().unwrap_or_default();
        backoff.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}
