//! Filters for error event queries.

use crate::core::Severity;
use crate::telemetry::event::ErrorEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selects error events. Unset fields match everything; time bounds are
/// inclusive.
///
/// ```rust
/// use resilience_engine::telemetry::EventFilter;
/// use resilience_engine::Severity;
///
/// let filter = EventFilter::new()
///     .with_service("classifier")
///     .with_severity(Severity::Critical);
/// assert_eq!(filter.service.as_deref(), Some("classifier"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events from this service.
    pub service: Option<String>,
    /// Only events from this operation.
    pub operation: Option<String>,
    /// Only events with this severity.
    pub severity: Option<Severity>,
    /// Only events at or after this time.
    pub start: Option<DateTime<Utc>>,
    /// Only events at or before this time.
    pub end: Option<DateTime<Utc>>,
    /// Only handled (or only unhandled) events.
    pub handled: Option<bool>,
}

impl EventFilter {
    /// Creates a filter that matches every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Restricts to one operation.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Restricts to one severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Restricts to events at or after `start`.
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Restricts to events at or before `end`.
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Restricts to events in `[start, end]`.
    pub fn between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.since(start).until(end)
    }

    /// Restricts by handled flag.
    pub fn with_handled(mut self, handled: bool) -> Self {
        self.handled = Some(handled);
        self
    }

    /// Returns `true` if the event passes every set criterion.
    pub fn matches(&self, event: &ErrorEvent) -> bool {
        self.service.as_ref().map_or(true, |s| *s == event.service)
            && self.operation.as_ref().map_or(true, |o| *o == event.operation)
            && self.severity.map_or(true, |s| s == event.severity)
            && self.start.map_or(true, |start| event.timestamp >= start)
            && self.end.map_or(true, |end| event.timestamp <= end)
            && self.handled.map_or(true, |h| h == event.handled)
    }
}
