//! Escalation ladder for challenges a fresh cookie did not clear.
//!
//! Each consecutive unresolved block bumps a counter, and the counter value
//! alone decides the remediation: cheap identity changes first, a long
//! cooldown only when blocking persists.

use std::time::Duration;

/// Pause before re-sending a blocked request.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Cooldown once blocking has persisted for [`COOLDOWN_THRESHOLD`] cycles.
pub const COOLDOWN: Duration = Duration::from_secs(10 * 60);

pub const COOLDOWN_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Retry as-is after [`RETRY_DELAY`].
    Retry,
    /// Derive a new user agent.
    RotateUserAgent,
    /// Replace the transport session.
    RecreateSession,
    /// Forget the stored challenge cookie, then replace the session.
    ResetChallengeCookie,
    /// Sleep [`COOLDOWN`], reset the counter and replace the session.
    Cooldown,
}

/// Remediation for the `count`-th consecutive unresolved block (1-based).
pub fn remediation(count: u32) -> Remediation {
    match count {
        1 => Remediation::RotateUserAgent,
        2 => Remediation::RecreateSession,
        4 => Remediation::ResetChallengeCookie,
        n if n >= COOLDOWN_THRESHOLD => Remediation::Cooldown,
        _ => Remediation::Retry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder() {
        assert_eq!(remediation(1), Remediation::RotateUserAgent);
        assert_eq!(remediation(2), Remediation::RecreateSession);
        assert_eq!(remediation(3), Remediation::Retry);
        assert_eq!(remediation(4), Remediation::ResetChallengeCookie);
        for count in 5..10 {
            assert_eq!(remediation(count), Remediation::Retry);
        }
        assert_eq!(remediation(10), Remediation::Cooldown);
        assert_eq!(remediation(11), Remediation::Cooldown);
    }

    #[test]
    fn test_zero_is_a_plain_retry() {
        assert_eq!(remediation(0), Remediation::Retry);
    }
}
