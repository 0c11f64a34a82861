//! Engine configuration.
//!
//! Configuration is plain data with serde support so it can be embedded in
//! a host application's settings or loaded from a TOML file. Durations are
//! expressed in milliseconds on disk (fields carry an `_ms` suffix).
//!
//! ```toml
//! [circuit_breaker]
//! failure_threshold = 5
//! recovery_timeout_ms = 30000
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! retryable_kinds = ["NetworkError", "TimeoutError", "ServiceUnavailable"]
//!
//! [telemetry]
//! retention_ms = 604800000
//! ```

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::core::ConfigError;
use crate::retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest duration accepted for any configured span (100 years).
///
/// Spans are added to or subtracted from wall-clock timestamps, so they must
/// stay well inside the range chrono can represent.
pub const MAX_SPAN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Records an error if `value` is longer than [`MAX_SPAN`].
pub(crate) fn check_span(name: &str, value: Duration, errors: &mut Vec<String>) {
    if value > MAX_SPAN {
        errors.push(format!("{name} must not exceed {} ms", MAX_SPAN.as_millis()));
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults for circuit breakers created without an explicit config.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Default retry policy.
    pub retry: RetryPolicy,
    /// Error telemetry retention and rate monitoring.
    pub telemetry: TelemetryConfig,
    /// Background job intervals.
    pub scheduler: SchedulerConfig,
    /// Degradation strategy setup.
    pub degradation: DegradationConfig,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Checks that all values are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        self.circuit_breaker.validate(&mut errors);
        self.retry.validate(&mut errors);
        self.telemetry.validate(&mut errors);
        self.scheduler.validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Telemetry retention and rate monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Error events older than this are evicted.
    #[serde(rename = "retention_ms", with = "duration_ms")]
    pub retention: Duration,

    /// Trailing window inspected by the rate monitor.
    #[serde(rename = "rate_window_ms", with = "duration_ms")]
    pub rate_window: Duration,

    /// Error ratio above which the rate monitor warns.
    pub rate_warn_threshold: f64,

    /// How long per-second traffic counts are kept.
    #[serde(rename = "traffic_retention_ms", with = "duration_ms")]
    pub traffic_retention: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            rate_window: Duration::from_secs(5 * 60),
            rate_warn_threshold: 0.1,
            traffic_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl TelemetryConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        if self.retention.is_zero() {
            errors.push("telemetry.retention_ms must be positive".into());
        }
        if self.rate_window.is_zero() {
            errors.push("telemetry.rate_window_ms must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.rate_warn_threshold) {
            errors.push("telemetry.rate_warn_threshold must be within [0, 1]".into());
        }
        check_span("telemetry.retention_ms", self.retention, errors);
        check_span("telemetry.rate_window_ms", self.rate_window, errors);
        check_span("telemetry.traffic_retention_ms", self.traffic_retention, errors);
    }
}

/// Intervals of the background jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the error rate monitor runs.
    #[serde(rename = "rate_monitor_interval_ms", with = "duration_ms")]
    pub rate_monitor_interval: Duration,

    /// How often expired telemetry is evicted.
    #[serde(rename = "eviction_interval_ms", with = "duration_ms")]
    pub eviction_interval: Duration,

    /// How often a periodic error report is generated.
    #[serde(rename = "report_interval_ms", with = "duration_ms")]
    pub report_interval: Duration,

    /// Period covered by each periodic report, ending at generation time.
    #[serde(rename = "report_lookback_ms", with = "duration_ms")]
    pub report_lookback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_monitor_interval: Duration::from_secs(60),
            eviction_interval: Duration::from_secs(60 * 60),
            report_interval: Duration::from_secs(60 * 60),
            report_lookback: Duration::from_secs(60 * 60),
        }
    }
}

impl SchedulerConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        for (name, value) in [
            ("rate_monitor_interval_ms", self.rate_monitor_interval),
            ("eviction_interval_ms", self.eviction_interval),
            ("report_interval_ms", self.report_interval),
        ] {
            if value.is_zero() {
                errors.push(format!("scheduler.{name} must be positive"));
            }
            check_span(&format!("scheduler.{name}"), value, errors);
        }
        check_span("scheduler.report_lookback_ms", self.report_lookback, errors);
    }
}

/// Degradation strategy setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Install the built-in fallback, response-time and circuit-open strategies.
    pub install_defaults: bool,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            install_defaults: true,
        }
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.retention, Duration::from_secs(604_800));
        assert_eq!(config.scheduler.rate_monitor_interval, Duration::from_secs(60));
        assert!(config.degradation.install_defaults);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [circuit_breaker]
            failure_threshold = 3

            [retry]
            max_attempts = 5
            retryable_kinds = ["NetworkError"]
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.retry.retryable_kinds.contains(&ErrorKind::Network));
        assert!(!config.retry.retryable_kinds.contains(&ErrorKind::Timeout));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let result = EngineConfig::from_toml_str(
            r#"
            [circuit_breaker]
            failure_threshold = 0

            [retry]
            max_attempts = 0

            [telemetry]
            rate_warn_threshold = 1.5
            "#,
        );

        match result {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_spans_beyond_clock_range() {
        let result = EngineConfig::from_toml_str(&format!(
            r#"
            [circuit_breaker]
            recovery_timeout_ms = {max}

            [telemetry]
            retention_ms = {max}

            [scheduler]
            report_lookback_ms = {max}
            "#,
            max = u64::MAX
        ));

        match result {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors[0].starts_with("circuit_breaker.recovery_timeout_ms"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut config = EngineConfig::default();
        config.telemetry.retention = MAX_SPAN;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nreport_interval_ms = 600000").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.report_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load("/nonexistent/resilience.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_serialize_round_trip_through_toml() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("recovery_timeout_ms = 30000"));
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
