// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff schedules with jitter.

use std::time::Duration;

use rand::Rng;

/// Retry schedule: `max_retries` retries after the first attempt, waiting
/// `initial_backoff * 2^n` (± `jitter`) before retry `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Fractional jitter, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Token refresh: 1s, 2s, 4s with ±20% jitter (four attempts total).
    pub fn refresh() -> Self {
        Self { max_retries: 3, initial_backoff: Duration::from_secs(1), jitter: 0.2 }
    }

    /// Persistence sync: 2s, 4s, 8s.
    pub fn persist() -> Self {
        Self { max_retries: 3, initial_backoff: Duration::from_secs(2), jitter: 0.0 }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Nominal backoff before retry `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Backoff before retry `retry` (0-based), with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64(factor.max(0.0))
    }

    /// Upper bound on time spent sleeping across all retries.
    pub fn total_backoff_bound(&self) -> Duration {
        (0..self.max_retries)
            .map(|n| self.base_delay(n).mul_f64(1.0 + self.jitter.max(0.0)))
            .sum()
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
