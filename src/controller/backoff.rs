//! # Backoff
//!
//! Bounded exponential backoff, shared by optimistic-concurrency retries
//! (status writes, `create_or_update`) and the controller error policy.

use crate::constants::{
    DEFAULT_CONFLICT_RETRY_ATTEMPTS, DEFAULT_CONFLICT_RETRY_BASE_MS, DEFAULT_CONFLICT_RETRY_MAX_MS,
};
use std::time::Duration;

/// Exponential backoff state for one retry sequence
///
/// Delays double from `min` and are capped at `max`:
/// 1s -> 2s -> 4s -> ... -> max
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            attempt: 0,
        }
    }

    /// Delay for the given zero-based attempt without touching any state
    pub fn delay_for(attempt: u32, min: Duration, max: Duration) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        min.checked_mul(factor).unwrap_or(max).min(max.max(min))
    }

    /// Return the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Self::delay_for(self.attempt, self.min, self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Bounded retry policy for optimistic-concurrency conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_MAX_MS),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        ExponentialBackoff::delay_for(attempt, self.base_delay, self.max_delay)
    }
}
