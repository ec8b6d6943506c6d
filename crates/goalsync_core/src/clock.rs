//! Wall-clock timestamps for sync envelopes.
//!
//! # Invariants
//! - Values are Unix epoch milliseconds.
//! - One `MonotonicClock` never hands out the same value twice and never
//!   goes backwards, even when the system clock does.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamp source used by stores when stamping `updated_at`.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Returns the current system time in epoch milliseconds.
///
/// Falls back to `0` for clocks set before the Unix epoch.
pub fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Strictly increasing clock seeded from system time.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose next value is at least `floor_ms + 1`.
    pub fn starting_after(floor_ms: i64) -> Self {
        Self {
            last: AtomicI64::new(floor_ms),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let wall = system_now_ms();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}
