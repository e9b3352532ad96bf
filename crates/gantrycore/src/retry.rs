use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for task execution: capped exponential backoff with no
/// jitter, so orchestration timing stays predictable and tests exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Maximum number of retries after the initial attempt.
    pub max_retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            max_retry_count: 3,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry `attempt` (1-based).
    ///
    /// `attempt <= 0` yields zero; otherwise
    /// `min(initial * multiplier^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: i64) -> Duration {
        if attempt <= 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether retry `attempt` (1-based) is permitted for this error.
    ///
    /// `attempt == max_retry_count` is the last allowed retry. Cancellation
    /// and timeouts are never retried; anything not known to be transient
    /// fails safe.
    pub fn should_retry(&self, error: &TaskError, attempt: u32) -> bool {
        if attempt > self.max_retry_count {
            return false;
        }
        match error {
            TaskError::Network { .. } => true,
            TaskError::Timeout { .. } | TaskError::Cancelled => false,
            _ => false,
        }
    }
}
