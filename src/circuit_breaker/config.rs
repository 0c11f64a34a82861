//! Circuit breaker configuration.

use crate::config::{check_span, duration_ms};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,

    /// How long to keep the circuit open before admitting a probe call.
    #[serde(rename = "recovery_timeout_ms", with = "duration_ms")]
    pub recovery_timeout: Duration,

    /// Maximum number of concurrent probes in half-open state.
    pub half_open_max_probes: u32,

    /// Response time above which calls are considered slow.
    #[serde(rename = "expected_response_time_ms", with = "duration_ms")]
    pub expected_response_time: Duration,

    /// Window over which failures are monitored.
    #[serde(rename = "monitoring_window_ms", with = "duration_ms")]
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_probes: 1,
            expected_response_time: Duration::from_secs(5),
            monitoring_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the recovery timeout.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the maximum number of half-open probes.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = max.max(1);
        self
    }

    /// Sets the expected response time.
    pub fn with_expected_response_time(mut self, expected: Duration) -> Self {
        self.expected_response_time = expected;
        self
    }

    /// Sets the monitoring window.
    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Creates a configuration for collaborators whose failures are costly.
    ///
    /// This configuration:
    /// - Uses a lower failure threshold (3)
    /// - Keeps circuits open longer (60 seconds)
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Creates a configuration optimized for high availability.
    ///
    /// This configuration:
    /// - Uses a higher failure threshold (10)
    /// - Keeps circuits open for a shorter time (10 seconds)
    /// - Allows more probe attempts
    pub fn high_availability() -> Self {
        Self {
            failure_threshold: 10,
            recovery_timeout: Duration::from_secs(10),
            half_open_max_probes: 3,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if self.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be at least 1".into());
        }
        if self.half_open_max_probes == 0 {
            errors.push("circuit_breaker.half_open_max_probes must be at least 1".into());
        }
        check_span("circuit_breaker.recovery_timeout_ms", self.recovery_timeout, errors);
        check_span(
            "circuit_breaker.expected_response_time_ms",
            self.expected_response_time,
            errors,
        );
        check_span("circuit_breaker.monitoring_window_ms", self.monitoring_window, errors);
    }
}
