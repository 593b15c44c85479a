//! Retry policy, reused by the activity-options glue in the `do` sequencer.
//!
//! Grounded on `durable::reliability::retry::RetryPolicy` (exponential
//! backoff with jitter); trimmed to what `spec.md` §7 actually needs —
//! retryable-vs-non-retryable classification is an `EngineError`/
//! `ActivityError` concern, this module only carries the backoff shape
//! that flows into `ActivityRequest`'s activity options.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    pub jitter: f64,
    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            jitter: 0.1,
            non_retryable_errors: Vec::new(),
        }
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_initial_interval(mut self, d: Duration) -> Self {
        self.initial_interval = d;
        self
    }

    pub fn with_max_interval(mut self, d: Duration) -> Self {
        self.max_interval = d;
        self
    }

    /// Delay before the `attempt`-th retry (1-indexed), with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_interval.as_secs_f64());
        let jitter_range = capped * self.jitter;
        let jittered = capped + rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub fn is_retryable_error(&self, error_type: &str) -> bool {
        !self.non_retryable_errors.iter().any(|e| e == error_type)
    }
}
