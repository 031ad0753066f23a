use std::time::Duration;

/// Exponential backoff between attempts.
///
/// The wait before attempt `k` (zero-based) is `base * 2^k`; the first
/// attempt never waits. `max_attempts` counts every try, including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// A policy allowing at least one attempt.
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the zero-based attempt `k`.
    pub fn delay_before(&self, k: u32) -> Duration {
        if k == 0 {
            return Duration::ZERO;
        }
        self.base.saturating_mul(2u32.saturating_pow(k))
    }

    /// Total wait accumulated by `retries` retries.
    pub fn total_wait(&self, retries: u32) -> Duration {
        (1..=retries).map(|k| self.delay_before(k)).sum()
    }
}
