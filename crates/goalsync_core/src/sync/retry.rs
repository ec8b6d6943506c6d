//! Bounded exponential backoff for failed sync passes.

use crate::config::MAX_SYNC_ATTEMPTS;
use std::time::Duration;

/// Attempt budget and backoff curve for one requested sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            MAX_SYNC_ATTEMPTS,
            Duration::from_secs(2),
            Duration::from_secs(60),
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped into `1..=MAX_SYNC_ATTEMPTS`.
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_SYNC_ATTEMPTS),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a retryable failure on `attempt` (1-based) earns another try.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `failed_attempt`:
    /// `initial * 2^(failed_attempt - 1)`, capped at the maximum.
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}
