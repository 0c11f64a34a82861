//! End-to-end flows through the engine facade.

use super::ResilienceEngine;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitStatus};
use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::core::{ActionError, ErrorKind, RequestContext, ServiceError, Severity};
use crate::degradation::{
    ActionContext, ActionHandler, CustomTrigger, DegradationAction, DegradationStrategy,
    Priority, Trigger, TriggerContext,
};
use crate::mock::ScriptedOperation;
use crate::report::ReportPeriod;
use crate::telemetry::EventFilter;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn engine_at(clock: &ManualClock, config: EngineConfig) -> ResilienceEngine {
    ResilienceEngine::builder()
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn breaker_lifecycle_through_facade() {
    let clock = ManualClock::starting_now();
    let engine = engine_at(&clock, EngineConfig::default());
    let failing = ScriptedOperation::<()>::always_failing(ServiceError::network("x", "reset"));

    for _ in 0..5 {
        let _ = engine
            .execute_with_circuit_breaker("x", || failing.call(), None)
            .await;
    }
    let healthy = ScriptedOperation::always_succeeding(());
    let rejected = engine
        .execute_with_circuit_breaker("x", || healthy.call(), None)
        .await;
    assert_eq!(rejected.unwrap_err().kind(), ErrorKind::CircuitOpen);
    assert_eq!(healthy.calls(), 0);

    clock.advance(Duration::from_secs(29));
    assert!(engine
        .execute_with_circuit_breaker("x", || healthy.call(), None)
        .await
        .is_err());
    assert_eq!(healthy.calls(), 0);

    clock.advance(Duration::from_secs(1));
    engine
        .execute_with_circuit_breaker("x", || healthy.call(), None)
        .await
        .unwrap();
    assert_eq!(healthy.calls(), 1);

    let state = engine.circuit_breaker_state("x").unwrap();
    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.failure_count, 0);
}

#[tokio::test]
async fn reset_is_idempotent_and_unknown_is_false() {
    let clock = ManualClock::starting_now();
    let engine = engine_at(&clock, EngineConfig::default());
    let config = CircuitBreakerConfig::default().with_failure_threshold(1);
    let _ = engine
        .execute_with_circuit_breaker(
            "x",
            || async { Err::<(), _>(ServiceError::internal("boom")) },
            Some(&config),
        )
        .await;

    assert!(engine.reset_circuit_breaker("x"));
    assert!(engine.reset_circuit_breaker("x"));
    assert!(engine.circuit_breaker_state("x").unwrap().is_closed());
    assert!(!engine.reset_circuit_breaker("missing"));
}

#[test]
fn events_survive_until_retention_passes() {
    let clock = ManualClock::starting_now();
    let engine = engine_at(&clock, EngineConfig::default());
    let event = engine.record_error(
        "x",
        "op",
        &ServiceError::validation("bad"),
        RequestContext::new(),
        Severity::Low,
    );

    clock.advance(Duration::from_secs((6 * 24 + 23) * 3600));
    engine.evict_expired();
    assert_eq!(engine.error_events(&EventFilter::new()).len(), 1);

    clock.advance(Duration::from_secs(3601));
    assert_eq!(engine.evict_expired(), 1);
    assert!(engine.error_events(&EventFilter::new()).is_empty());
    assert!(engine.mark_error_as_handled(event.id, None).is_err());
}

#[test]
fn report_ranks_kinds_and_counts_resolutions() {
    let clock = ManualClock::starting_now();
    let start = clock.now();
    let engine = engine_at(&clock, EngineConfig::default());

    let mut ids = Vec::new();
    for i in 0..10 {
        let error = if i < 3 {
            ServiceError::other("A", "first")
        } else {
            ServiceError::other("B", "second")
        };
        let event = engine.record_error("svc", "op", &error, RequestContext::new(), Severity::Medium);
        ids.push(event.id);
        clock.advance(Duration::from_secs(1));
    }
    clock.advance(Duration::from_secs(10));
    engine.mark_error_as_handled(ids[0], Some("fixed".into())).unwrap();

    let report = engine.generate_error_report(ReportPeriod::new(start, clock.now()));
    assert_eq!(report.summary.total_errors, 10);
    assert_eq!(report.summary.resolved_errors, 1);
    assert_eq!(report.summary.average_resolution_time, Duration::from_secs(20));

    let top: Vec<_> = report
        .top_errors
        .iter()
        .map(|t| (t.kind.as_str(), t.count, t.percentage))
        .collect();
    assert_eq!(top, vec![("B", 7, 70.0), ("A", 3, 30.0)]);
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<(String, String)>>,
}

impl ActionHandler for Arc<RecordingHandler> {
    fn execute(&self, ctx: &ActionContext<'_>, action: &DegradationAction) -> Result<(), ActionError> {
        self.seen
            .lock()
            .push((ctx.event.service.clone(), action.target.clone()));
        Ok(())
    }
}

struct CriticalOnly;

impl CustomTrigger for CriticalOnly {
    fn should_trigger(&self, ctx: &TriggerContext<'_>) -> bool {
        ctx.event.severity == Severity::Critical
    }
}

#[test]
fn custom_strategy_runs_registered_handler() {
    let clock = ManualClock::starting_now();
    let handler = Arc::new(RecordingHandler::default());
    let mut config = EngineConfig::default();
    config.degradation.install_defaults = false;

    let engine = ResilienceEngine::builder()
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .add_strategy(
            DegradationStrategy::new("page-oncall", Trigger::custom(0.0, Duration::ZERO))
                .with_action(DegradationAction::custom("pager"))
                .with_priority(Priority::Critical),
        )
        .with_action_handler("pager", Arc::clone(&handler))
        .with_custom_trigger("page-oncall", CriticalOnly)
        .build()
        .unwrap();

    engine.record_error(
        "ledger",
        "post",
        &ServiceError::internal("disk full"),
        RequestContext::new(),
        Severity::High,
    );
    assert!(handler.seen.lock().is_empty());

    engine.record_error(
        "ledger",
        "post",
        &ServiceError::internal("disk full"),
        RequestContext::new(),
        Severity::Critical,
    );
    assert_eq!(
        *handler.seen.lock(),
        vec![("ledger".to_string(), "pager".to_string())]
    );
}

#[tokio::test]
async fn config_from_toml_drives_breakers() {
    let config = EngineConfig::from_toml_str(
        r#"
        [circuit_breaker]
        failure_threshold = 2
        recovery_timeout_ms = 1000
        "#,
    )
    .unwrap();
    let clock = ManualClock::starting_now();
    let engine = engine_at(&clock, config);
    let op = ScriptedOperation::<()>::always_failing(ServiceError::internal("boom"));

    for _ in 0..3 {
        let _ = engine.execute_with_circuit_breaker("x", || op.call(), None).await;
    }
    assert_eq!(op.calls(), 2);

    clock.advance(Duration::from_secs(1));
    let _ = engine.execute_with_circuit_breaker("x", || op.call(), None).await;
    assert_eq!(op.calls(), 3);
    assert!(engine.circuit_breaker_state("x").unwrap().is_open());
}

#[tokio::test(start_paused = true)]
async fn retry_backoff_and_non_retryable_through_facade() {
    let engine = ResilienceEngine::new();
    let policy = crate::retry::RetryPolicy::new()
        .with_max_attempts(5)
        .with_base_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(10));
    engine.set_retry_policy("flaky", policy);

    let started = tokio::time::Instant::now();
    let op = ScriptedOperation::<()>::always_failing(ServiceError::timeout("flaky", Duration::from_secs(2)));
    let result = engine.execute_with_retry("flaky", || op.call(), None).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
    assert_eq!(op.calls(), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(15));

    let invalid = ScriptedOperation::<()>::always_failing(ServiceError::validation("bad input"));
    let result = engine.execute_with_retry("flaky", || invalid.call(), None).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(invalid.calls(), 1);
}
