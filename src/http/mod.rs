//! HTTP transport: session, cookie store and transient-failure retry.

mod cookies;
mod retry;
mod session;

pub use cookies::{CHALLENGE_COOKIE, ChallengeJar};
pub use retry::{
    BACKOFF_FACTOR, MAX_BACKOFF, MAX_RETRIES, RETRYABLE_STATUSES, RetryPolicy, is_retryable_error,
    is_retryable_status,
};
pub use session::{
    ApiResponse, SessionSettings, TgtgSession, X_CORRELATION_ID, process_correlation_id,
};
