//! Report generation.

use crate::audit;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::clock::{to_std, SharedClock};
use crate::core::Severity;
use crate::report::types::{ErrorReport, ReportPeriod, ReportSummary, TopError};
use crate::telemetry::{ErrorEvent, ErrorTelemetryStore, EventFilter, RateSample};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const TOP_ERRORS: usize = 10;

/// Builds [`ErrorReport`]s from the telemetry store and the breaker
/// registry.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    telemetry: Arc<ErrorTelemetryStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    clock: SharedClock,
}

impl ReportGenerator {
    /// Creates a generator over the given components.
    pub fn new(
        telemetry: Arc<ErrorTelemetryStore>,
        breakers: Arc<CircuitBreakerRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            telemetry,
            breakers,
            clock,
        }
    }

    /// Summarizes the errors recorded in `period`.
    pub fn generate(&self, period: ReportPeriod) -> ErrorReport {
        let events = self
            .telemetry
            .query(&EventFilter::new().between(period.start, period.end));
        let requests = self
            .telemetry
            .count_requests(None, period.start, period.end);

        let report = ErrorReport {
            id: Uuid::new_v4(),
            period,
            summary: summarize(&events, requests, &period),
            top_errors: top_errors(&events),
            circuit_breakers: self.breakers.all(),
            generated_at: self.clock.now(),
        };

        audit::emit_report_generated(&report);
        report
    }
}

fn summarize(events: &[ErrorEvent], requests: u64, period: &ReportPeriod) -> ReportSummary {
    let total_errors = events.len() as u64;
    let critical_errors = events
        .iter()
        .filter(|e| e.severity == Severity::Critical)
        .count() as u64;

    let resolution_times: Vec<Duration> = events
        .iter()
        .filter(|e| e.handled)
        .map(|e| match e.handled_at {
            Some(at) => to_std(at - e.timestamp),
            None => to_std(e.timestamp - period.start),
        })
        .collect();
    let average_resolution_time = if resolution_times.is_empty() {
        Duration::ZERO
    } else {
        let total: Duration = resolution_times.iter().sum();
        total / resolution_times.len() as u32
    };

    ReportSummary {
        total_errors,
        error_rate: RateSample::new(total_errors, requests).rate,
        critical_errors,
        resolved_errors: resolution_times.len() as u64,
        average_resolution_time,
    }
}

/// Counts errors by kind label, most frequent first; ties go to the
/// alphabetically smaller label.
fn top_errors(events: &[ErrorEvent]) -> Vec<TopError> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for event in events {
        *counts.entry(event.error.kind_name.as_str()).or_insert(0) += 1;
    }

    let total = events.len() as f64;
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|(a_kind, a_count), (b_kind, b_count)| {
        b_count.cmp(a_count).then_with(|| a_kind.cmp(b_kind))
    });
    ranked
        .into_iter()
        .take(TOP_ERRORS)
        .map(|(kind, count)| TopError {
            kind: kind.to_string(),
            count,
            percentage: count as f64 * 100.0 / total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::clock::{Clock, ManualClock};
    use crate::config::TelemetryConfig;
    use crate::core::{RequestContext, ServiceError};
    use chrono::{DateTime, Utc};

    struct Fixture {
        clock: ManualClock,
        telemetry: Arc<ErrorTelemetryStore>,
        generator: ReportGenerator,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let telemetry = Arc::new(ErrorTelemetryStore::with_config(
            TelemetryConfig::default(),
            Arc::clone(&shared),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::with_config(
            CircuitBreakerConfig::default(),
            Arc::clone(&shared),
        ));
        Fixture {
            generator: ReportGenerator::new(Arc::clone(&telemetry), breakers, shared),
            telemetry,
            clock,
        }
    }

    fn other(kind: &str) -> ServiceError {
        ServiceError::other(kind, "failure")
    }

    #[test]
    fn test_top_errors_ranked_with_percentages() {
        let fx = fixture();
        let start = fx.clock.now();
        for _ in 0..3 {
            fx.telemetry
                .record("svc", "op", &other("A"), RequestContext::new(), Severity::Medium);
        }
        for _ in 0..7 {
            fx.telemetry
                .record("svc", "op", &other("B"), RequestContext::new(), Severity::Medium);
        }

        let report = fx.generator.generate(ReportPeriod::new(start, fx.clock.now()));
        assert_eq!(report.summary.total_errors, 10);
        assert_eq!(
            report.top_errors,
            vec![
                TopError {
                    kind: "B".into(),
                    count: 7,
                    percentage: 70.0
                },
                TopError {
                    kind: "A".into(),
                    count: 3,
                    percentage: 30.0
                },
            ]
        );
    }

    #[test]
    fn test_ties_break_by_name_and_list_is_capped() {
        let fx = fixture();
        let start = fx.clock.now();
        for kind in ["M", "L", "K", "J", "I", "H", "G", "F", "E", "D", "C", "B", "A"] {
            fx.telemetry
                .record("svc", "op", &other(kind), RequestContext::new(), Severity::Low);
        }

        let report = fx.generator.generate(ReportPeriod::new(start, fx.clock.now()));
        let kinds: Vec<_> = report.top_errors.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"]);
    }

    #[test]
    fn test_summary_counts_and_resolution_time() {
        let fx = fixture();
        let start = fx.clock.now();
        let critical = fx.telemetry.record(
            "svc",
            "op",
            &ServiceError::internal("disk full"),
            RequestContext::new(),
            Severity::Critical,
        );
        fx.telemetry.record(
            "svc",
            "op",
            &ServiceError::validation("bad"),
            RequestContext::new(),
            Severity::Low,
        );
        for _ in 0..18 {
            fx.telemetry.record_request("svc");
        }

        fx.clock.advance(Duration::from_secs(120));
        fx.telemetry.mark_handled(critical.id, None).unwrap();

        let report = fx.generator.generate(ReportPeriod::new(start, fx.clock.now()));
        assert_eq!(report.summary.total_errors, 2);
        assert_eq!(report.summary.critical_errors, 1);
        assert_eq!(report.summary.resolved_errors, 1);
        assert_eq!(report.summary.average_resolution_time, Duration::from_secs(120));
        assert!((report.summary.error_rate - 2.0 / 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbounded_lookback_covers_all_history() {
        let fx = fixture();
        fx.telemetry
            .record("svc", "op", &other("A"), RequestContext::new(), Severity::Low);
        fx.clock.advance(Duration::from_secs(3600));

        let period = ReportPeriod::ending_at(fx.clock.now(), Duration::MAX);
        assert_eq!(period.start, DateTime::<Utc>::MIN_UTC);

        let report = fx.generator.generate(period);
        assert_eq!(report.summary.total_errors, 1);
        assert_eq!(report.top_errors[0].kind, "A");
    }

    #[test]
    fn test_events_outside_period_are_ignored() {
        let fx = fixture();
        fx.telemetry
            .record("svc", "op", &other("A"), RequestContext::new(), Severity::Low);
        fx.clock.advance(Duration::from_secs(10));
        let start = fx.clock.now();

        let report = fx.generator.generate(ReportPeriod::new(start, fx.clock.now()));
        assert_eq!(report.summary.total_errors, 0);
        assert_eq!(report.summary.error_rate, 0.0);
        assert!(report.top_errors.is_empty());
    }
}
