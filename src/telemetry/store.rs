//! The in-memory error telemetry store.

use crate::audit;
use crate::clock::{saturating_before, SharedClock, SystemClock};
use crate::config::TelemetryConfig;
use crate::core::{EngineError, EngineResult, RequestContext, ServiceError, Severity};
use crate::telemetry::event::{ErrorDetails, ErrorEvent};
use crate::telemetry::filter::EventFilter;
use crate::telemetry::traffic::TrafficLog;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Error ratio observed over a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    /// Errors recorded in the window.
    pub errors: u64,
    /// Requests observed in the window.
    pub requests: u64,
    /// `errors / max(requests, errors)`, or 0 when there were no errors.
    pub rate: f64,
}

impl RateSample {
    /// Computes the ratio for the given counts.
    ///
    /// Errors recorded without matching traffic count as their own
    /// requests, so the rate never exceeds 1.
    pub fn new(errors: u64, requests: u64) -> Self {
        let denominator = requests.max(errors);
        let rate = if errors == 0 {
            0.0
        } else {
            errors as f64 / denominator as f64
        };
        Self {
            errors,
            requests,
            rate,
        }
    }
}

/// Append-only, time-bounded log of error events plus request traffic.
///
/// Events are appended in recording order and only removed by
/// [`evict`](Self::evict). Queries copy matching events out under a read
/// lock, so callers always see a consistent snapshot.
#[derive(Debug)]
pub struct ErrorTelemetryStore {
    events: RwLock<Vec<ErrorEvent>>,
    traffic: TrafficLog,
    config: TelemetryConfig,
    clock: SharedClock,
}

impl ErrorTelemetryStore {
    /// Creates a store with default retention and the system clock.
    pub fn new() -> Self {
        Self::with_config(TelemetryConfig::default(), Arc::new(SystemClock))
    }

    /// Creates a store with the given settings and clock.
    pub fn with_config(config: TelemetryConfig, clock: SharedClock) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            traffic: TrafficLog::new(),
            config,
            clock,
        }
    }

    /// Returns the store settings.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Records a failure and returns the stored event.
    ///
    /// Callers outside the crate go through
    /// [`ResilienceEngine::record_error`](crate::engine::ResilienceEngine::record_error),
    /// which also evaluates degradation strategies.
    pub(crate) fn record(
        &self,
        service: &str,
        operation: &str,
        error: &ServiceError,
        context: RequestContext,
        severity: Severity,
    ) -> ErrorEvent {
        self.record_details(service, operation, ErrorDetails::from(error), context, severity)
    }

    /// Records a failure described by `details`.
    pub(crate) fn record_details(
        &self,
        service: &str,
        operation: &str,
        details: ErrorDetails,
        context: RequestContext,
        severity: Severity,
    ) -> ErrorEvent {
        let event = ErrorEvent::new(
            self.clock.now(),
            service,
            operation,
            details,
            context,
            severity,
        );
        self.events.write().push(event.clone());
        audit::emit_error_recorded(&event);
        event
    }

    /// Counts one request to `service` at the current time.
    pub fn record_request(&self, service: &str) {
        self.traffic.record(service, self.clock.now());
    }

    /// Returns events matching `filter`, newest first.
    ///
    /// Events with equal timestamps are returned most recently recorded
    /// first.
    pub fn query(&self, filter: &EventFilter) -> Vec<ErrorEvent> {
        let mut matched: Vec<ErrorEvent> = self
            .events
            .read()
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }

    /// Returns the event with the given ID.
    pub fn get(&self, id: Uuid) -> Option<ErrorEvent> {
        self.events.read().iter().find(|e| e.id == id).cloned()
    }

    /// Marks an event as handled and returns its new state.
    pub fn mark_handled(&self, id: Uuid, resolution: Option<String>) -> EngineResult<ErrorEvent> {
        let now = self.clock.now();
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| EngineError::EventNotFound { id: id.to_string() })?;
        event.mark_handled(now, resolution);
        let event = event.clone();
        drop(events);

        audit::emit_error_handled(&event);
        Ok(event)
    }

    /// Drops events older than the retention period and prunes traffic
    /// counts. Returns the number of events removed.
    pub fn evict(&self) -> usize {
        let now = self.clock.now();
        let cutoff = saturating_before(now, self.config.retention);

        let removed = {
            let mut events = self.events.write();
            let before = events.len();
            events.retain(|e| e.timestamp >= cutoff);
            before - events.len()
        };
        let buckets = self
            .traffic
            .prune(saturating_before(now, self.config.traffic_retention));

        tracing::debug!(
            removed,
            traffic_buckets = buckets,
            cutoff = %cutoff,
            "Evicted expired telemetry"
        );
        removed
    }

    /// Returns the number of errors in `[start, end]`.
    pub fn count_errors(
        &self,
        service: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u64 {
        self.events
            .read()
            .iter()
            .filter(|e| service.map_or(true, |s| s == e.service))
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .count() as u64
    }

    /// Returns the number of requests in `[start, end]`.
    pub fn count_requests(
        &self,
        service: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u64 {
        self.traffic.count(service, start, end)
    }

    /// Computes the error ratio over the trailing `window`.
    pub fn error_rate(&self, service: Option<&str>, window: Duration) -> RateSample {
        let end = self.clock.now();
        let start = saturating_before(end, window);
        RateSample::new(
            self.count_errors(service, start, end),
            self.count_requests(service, start, end),
        )
    }

    /// Checks the overall error ratio over the configured window and warns
    /// when it exceeds the configured threshold.
    pub fn monitor_rate(&self) -> RateSample {
        let sample = self.error_rate(None, self.config.rate_window);
        if sample.rate > self.config.rate_warn_threshold {
            tracing::warn!(
                errors = sample.errors,
                requests = sample.requests,
                error_rate = sample.rate,
                window_ms = self.config.rate_window.as_millis() as u64,
                "High error rate detected"
            );
        } else {
            tracing::trace!(
                errors = sample.errors,
                requests = sample.requests,
                error_rate = sample.rate,
                "Error rate within threshold"
            );
        }
        sample
    }

    /// Returns the number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns `true` if no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for ErrorTelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store(clock: &ManualClock) -> ErrorTelemetryStore {
        ErrorTelemetryStore::with_config(TelemetryConfig::default(), Arc::new(clock.clone()))
    }

    fn record(store: &ErrorTelemetryStore, service: &str) -> ErrorEvent {
        store.record(
            service,
            "classify",
            &ServiceError::network(service, "reset"),
            RequestContext::new(),
            Severity::Medium,
        )
    }

    #[test]
    fn test_record_and_query_newest_first() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);

        let first = record(&store, "a");
        clock.advance(Duration::from_secs(1));
        let second = record(&store, "b");
        clock.advance(Duration::from_secs(1));
        let third = record(&store, "a");

        let all: Vec<_> = store.query(&EventFilter::new()).into_iter().map(|e| e.id).collect();
        assert_eq!(all, vec![third.id, second.id, first.id]);

        let only_a = store.query(&EventFilter::new().with_service("a"));
        assert_eq!(only_a.len(), 2);
        assert!(!only_a[0].handled);
    }

    #[test]
    fn test_mark_handled() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);
        let event = record(&store, "a");

        clock.advance(Duration::from_secs(90));
        let updated = store
            .mark_handled(event.id, Some("failed over".into()))
            .unwrap();
        assert!(updated.handled);
        assert_eq!(updated.time_to_resolution(), Some(chrono::Duration::seconds(90)));
        assert_eq!(store.get(event.id).unwrap(), updated);

        let missing = store.mark_handled(Uuid::new_v4(), None);
        assert!(matches!(missing, Err(EngineError::EventNotFound { .. })));
    }

    #[test]
    fn test_eviction_respects_retention() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);
        let event = record(&store, "a");

        clock.advance(Duration::from_secs(6 * 24 * 3600 + 23 * 3600));
        assert_eq!(store.evict(), 0);
        assert!(store.get(event.id).is_some());

        clock.advance(Duration::from_secs(3600 + 1));
        assert_eq!(store.evict(), 1);
        assert!(store.query(&EventFilter::new()).is_empty());
    }

    #[test]
    fn test_unbounded_retention_never_evicts() {
        let clock = ManualClock::starting_now();
        let config = TelemetryConfig {
            retention: Duration::MAX,
            traffic_retention: Duration::MAX,
            ..TelemetryConfig::default()
        };
        let store = ErrorTelemetryStore::with_config(config, Arc::new(clock.clone()));
        store.record_request("a");
        let event = record(&store, "a");

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(store.evict(), 0);
        assert!(store.get(event.id).is_some());

        let sample = store.error_rate(Some("a"), Duration::MAX);
        assert_eq!((sample.errors, sample.requests), (1, 1));
    }

    #[test]
    fn test_error_rate_uses_traffic() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);

        for _ in 0..20 {
            store.record_request("a");
        }
        record(&store, "a");
        record(&store, "a");

        let sample = store.error_rate(Some("a"), Duration::from_secs(60));
        assert_eq!(sample.errors, 2);
        assert_eq!(sample.requests, 20);
        assert!((sample.rate - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_rate_without_traffic_falls_back_to_errors() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);
        assert_eq!(store.monitor_rate().rate, 0.0);

        record(&store, "a");
        let sample = store.monitor_rate();
        assert_eq!(sample.requests, 0);
        assert_eq!(sample.rate, 1.0);
    }

    #[test]
    fn test_rate_window_excludes_old_errors() {
        let clock = ManualClock::starting_now();
        let store = store(&clock);
        record(&store, "a");
        clock.advance(Duration::from_secs(301));

        assert_eq!(store.monitor_rate().errors, 0);
    }
}
