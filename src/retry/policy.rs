//! Retry policy and backoff calculation.

use crate::config::duration_ms;
use crate::core::{ErrorKind, ServiceError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,

    /// Error kinds that are worth another attempt.
    pub retryable_kinds: BTreeSet<ErrorKind>,

    /// Whether to spread delays with deterministic jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retryable_kinds: [
                ErrorKind::Network,
                ErrorKind::Timeout,
                ErrorKind::ServiceUnavailable,
            ]
            .into_iter()
            .collect(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Replaces the set of retryable kinds.
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Adds a retryable kind.
    pub fn with_retryable_kind(mut self, kind: ErrorKind) -> Self {
        self.retryable_kinds.insert(kind);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the delay to wait after attempt number `attempt` (1-based) fails.
    ///
    /// Without jitter this is `min(base_delay * multiplier^(attempt - 1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_delay = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        let final_delay = if self.jitter {
            // Simple deterministic jitter based on attempt number
            let jitter_factor = 0.5 + (attempt as f64 * 0.618033988749895) % 0.5;
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Returns whether another attempt may follow attempt number `attempt`.
    ///
    /// A policy always allows the first attempt, even with `max_attempts`
    /// set to zero.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Returns whether the error is eligible for another attempt.
    pub fn is_retryable(&self, error: &ServiceError) -> bool {
        self.retryable_kinds.contains(&error.kind())
    }

    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if self.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".into());
        }
        if !(self.backoff_multiplier >= 1.0) {
            errors.push("retry.backoff_multiplier must be at least 1".into());
        }
        if self.base_delay > self.max_delay {
            errors.push("retry.base_delay_ms must not exceed retry.max_delay_ms".into());
        }
    }
}
