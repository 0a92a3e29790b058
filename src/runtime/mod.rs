//! Runtime abstraction for time and randomness.
//!
//! Sleeping, reading the wall clock and drawing random values all go through
//! the [`Runtime`] trait so that the login and anti-bot loops can be tested
//! without real waits and with deterministic fingerprints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Suspend the current task.
    async fn sleep(&self, duration: Duration);

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Uniformly pick an index in `0..len`. `len` is never zero.
    fn choose_index(&self, len: usize) -> usize;

    /// `bytes` random bytes rendered as lowercase hex.
    fn random_hex(&self, bytes: usize) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealRuntime;

#[async_trait]
impl Runtime for RealRuntime {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn choose_index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn random_hex(&self, bytes: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..bytes)
            .map(|_| format!("{:02x}", rng.r#gen::<u8>()))
            .collect()
    }
}
