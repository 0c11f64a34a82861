//! Error report data types.

use crate::circuit_breaker::CircuitBreakerState;
use crate::clock::saturating_before;
use crate::config::duration_ms;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Time range covered by a report, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// Start of the period.
    pub start: DateTime<Utc>,
    /// End of the period.
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    /// Creates a period.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Creates the period of length `lookback` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: saturating_before(end, lookback),
            end,
        }
    }

    /// Returns `true` if `at` falls inside the period.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Aggregate figures for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Errors recorded in the period.
    pub total_errors: u64,
    /// errors / max(requests, errors) over the period.
    pub error_rate: f64,
    /// Errors with critical severity.
    pub critical_errors: u64,
    /// Errors marked as handled.
    pub resolved_errors: u64,
    /// Mean time to resolution of handled errors.
    #[serde(rename = "average_resolution_time_ms", with = "duration_ms")]
    pub average_resolution_time: Duration,
}

/// One of the most frequent error kinds in a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopError {
    /// Error kind label.
    pub kind: String,
    /// Occurrences in the period.
    pub count: u64,
    /// Share of all errors in the period, 0–100.
    pub percentage: f64,
}

/// Summary of recorded errors and breaker states over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Unique report ID.
    pub id: Uuid,
    /// Covered period.
    pub period: ReportPeriod,
    /// Aggregate figures.
    pub summary: ReportSummary,
    /// Up to ten most frequent kinds, by count then name.
    pub top_errors: Vec<TopError>,
    /// State of every breaker when the report was generated.
    pub circuit_breakers: Vec<CircuitBreakerState>,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

impl ErrorReport {
    /// Returns the breakers that were open when the report was generated.
    pub fn open_breakers(&self) -> impl Iterator<Item = &CircuitBreakerState> {
        self.circuit_breakers.iter().filter(|b| b.is_open())
    }
}
