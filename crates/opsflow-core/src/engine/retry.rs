//! Bounded automatic retry for checkpoint faults.

use chrono::Utc;
use std::time::Duration;

/// Retry policy applied to faults raised inside a single execution run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of automatic retries before the run fails (0 = none)
    pub max_retries: u32,
    /// Fixed delay before each re-attempt
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Per-run retry bookkeeping. A fresh state is created for every pipeline
/// run, so a manual retry always starts with a clean budget.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Number of faults absorbed so far in this run
    pub attempt: u32,
    pub last_error: Option<String>,
    pub last_failure_at: Option<i64>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, error: &str) {
        self.attempt += 1;
        self.last_error = Some(error.to_string());
        self.last_failure_at = Some(Utc::now().timestamp_millis());
    }

    pub fn is_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempt >= policy.max_retries
    }
}
