//! Retry policy for guarded downstream calls.
//!
//! # Design Decisions
//! - Bounded: `max_attempts` counts the first attempt, so 1 means no retry
//! - Each attempt goes through the breaker and is recorded on its own
//! - Backoff between attempts uses jittered exponential delays

use std::time::Duration;

use super::backoff::backoff_delay;
use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Pause before the attempt following `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_delay(self, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
