//! Retry policy for transient transport failures.
//!
//! Only infrastructure hiccups are retried here: throttling, gateway errors and
//! connection failures. Authentication and anti-bot responses are handed back
//! to the caller untouched.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Statuses retried by the transport.
pub const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: usize = 5;

/// First backoff delay; doubled on every further retry.
pub const BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Longest single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_factor: BACKOFF_FACTOR,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): `factor * 2^(retry - 1)`, capped.
    pub fn backoff(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(31) as u32;
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry`, honouring a numeric `Retry-After` on 429/503.
    pub fn delay_for(&self, retry: usize, status: StatusCode, headers: &HeaderMap) -> Duration {
        let honours_retry_after = matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        );
        match retry_after_seconds(headers) {
            Some(seconds) if honours_retry_after => {
                Duration::from_secs(seconds).min(self.max_backoff)
            }
            _ => self.backoff(retry),
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Connection and timeout failures are worth another attempt; anything else is not.
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
