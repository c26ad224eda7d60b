//! Bounded exponential backoff schedule.
//!
//! Only the schedule lives here; the async executor that sleeps between
//! attempts is in the storefront's service layer.

use std::time::Duration;

/// How many times, and how far apart, an operation is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` once the attempts are exhausted.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let multiplier = self.factor.saturating_pow(attempt - 1);
        let delay = self
            .initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// Every delay the policy would sleep, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}
