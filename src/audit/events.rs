//! Audit event types and emission functions.

use crate::circuit_breaker::{CircuitBreakerState, CircuitStatus, Transition};
use crate::degradation::DegradationStrategy;
use crate::report::ErrorReport;
use crate::telemetry::ErrorEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a circuit breaker changing status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerTransitionEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Breaker name.
    pub breaker: String,

    /// Status before the change.
    pub from: CircuitStatus,

    /// Status after the change.
    pub to: CircuitStatus,

    /// Failure streak at the time of the change.
    pub failure_count: u32,

    /// Lifetime success rate.
    pub success_rate: f64,

    /// When a probe will next be admitted, if open.
    pub next_attempt_time: Option<DateTime<Utc>>,
}

impl BreakerTransitionEvent {
    /// Builds the event from a breaker snapshot taken after the change.
    pub fn new(state: &CircuitBreakerState, transition: Transition, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            breaker: state.name.clone(),
            from: transition.from,
            to: transition.to,
            failure_count: state.failure_count,
            success_rate: state.success_rate,
            next_attempt_time: state.next_attempt_time,
        }
    }
}

impl AuditEvent for BreakerTransitionEvent {
    fn event_type(&self) -> &'static str {
        "breaker_transition"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for an error being recorded or marked as handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Error event ID.
    pub event_id: String,

    /// Service name.
    pub service: String,

    /// Operation name.
    pub operation: String,

    /// Error kind label.
    pub kind: String,

    /// Severity.
    pub severity: String,

    /// Whether it has been handled.
    pub handled: bool,

    /// Resolution note, if handled.
    pub resolution: Option<String>,

    /// User ID, if available.
    pub user_id: Option<String>,

    /// Request ID, if available.
    pub request_id: Option<String>,
}

impl From<&ErrorEvent> for ErrorAuditEvent {
    fn from(event: &ErrorEvent) -> Self {
        Self {
            timestamp: event.handled_at.unwrap_or(event.timestamp),
            event_id: event.id.to_string(),
            service: event.service.clone(),
            operation: event.operation.clone(),
            kind: event.error.kind_name.clone(),
            severity: event.severity.to_string(),
            handled: event.handled,
            resolution: event.resolution.clone(),
            user_id: event.context.user_id.clone(),
            request_id: event.context.request_id.clone(),
        }
    }
}

impl AuditEvent for ErrorAuditEvent {
    fn event_type(&self) -> &'static str {
        if self.handled {
            "error_handled"
        } else {
            "error_recorded"
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a degradation strategy firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTriggeredEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Strategy ID.
    pub strategy_id: String,

    /// Strategy name.
    pub strategy_name: String,

    /// Trigger type.
    pub trigger: String,

    /// Priority.
    pub priority: String,

    /// Service of the error that caused the evaluation.
    pub service: String,

    /// ID of that error event.
    pub error_event_id: String,

    /// Number of actions about to run.
    pub action_count: usize,
}

impl StrategyTriggeredEvent {
    /// Builds the event.
    pub fn new(strategy: &DegradationStrategy, event: &ErrorEvent, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            strategy_id: strategy.id.clone(),
            strategy_name: strategy.name.clone(),
            trigger: strategy.trigger.trigger_type.to_string(),
            priority: strategy.priority.to_string(),
            service: event.service.clone(),
            error_event_id: event.id.to_string(),
            action_count: strategy.actions.len(),
        }
    }
}

impl AuditEvent for StrategyTriggeredEvent {
    fn event_type(&self) -> &'static str {
        "strategy_triggered"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a generated error report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Report ID.
    pub report_id: String,

    /// Start of the covered period.
    pub period_start: DateTime<Utc>,

    /// End of the covered period.
    pub period_end: DateTime<Utc>,

    /// Errors in the period.
    pub total_errors: u64,

    /// Error ratio over the period.
    pub error_rate: f64,

    /// Critical errors in the period.
    pub critical_errors: u64,

    /// Breakers open at generation time.
    pub open_breakers: Vec<String>,
}

impl From<&ErrorReport> for ReportAuditEvent {
    fn from(report: &ErrorReport) -> Self {
        Self {
            timestamp: report.generated_at,
            report_id: report.id.to_string(),
            period_start: report.period.start,
            period_end: report.period.end,
            total_errors: report.summary.total_errors,
            error_rate: report.summary.error_rate,
            critical_errors: report.summary.critical_errors,
            open_breakers: report.open_breakers().map(|b| b.name.clone()).collect(),
        }
    }
}

impl AuditEvent for ReportAuditEvent {
    fn event_type(&self) -> &'static str {
        "report_generated"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a breaker status change.
///
/// Openings are logged at `WARN`, every other change at `INFO`.
pub fn emit_breaker_transition(
    state: &CircuitBreakerState,
    transition: Transition,
    at: DateTime<Utc>,
) {
    let event = BreakerTransitionEvent::new(state, transition, at);
    if event.to == CircuitStatus::Open {
        tracing::warn!(
            target: "resilience_engine::audit",
            event_type = event.event_type(),
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            failure_count = event.failure_count,
            success_rate = event.success_rate,
            next_attempt_time = ?event.next_attempt_time,
            times_opened = state.times_opened,
            "Circuit breaker opened"
        );
    } else {
        tracing::info!(
            target: "resilience_engine::audit",
            event_type = event.event_type(),
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            failure_count = event.failure_count,
            success_rate = event.success_rate,
            "Circuit breaker state changed"
        );
    }
}

/// Emits an audit event for a call rejected by an open breaker.
pub fn emit_call_rejected(breaker: &str, retry_after: DateTime<Utc>) {
    tracing::debug!(
        target: "resilience_engine::audit",
        event_type = "call_rejected",
        breaker = %breaker,
        retry_after = %retry_after,
        "Call rejected by open circuit"
    );
}

/// Emits an audit event for a recorded error.
pub fn emit_error_recorded(event: &ErrorEvent) {
    let audit = ErrorAuditEvent::from(event);
    tracing::error!(
        target: "resilience_engine::audit",
        event_type = audit.event_type(),
        event_id = %audit.event_id,
        service = %audit.service,
        operation = %audit.operation,
        kind = %audit.kind,
        severity = %audit.severity,
        user_id = ?audit.user_id,
        request_id = ?audit.request_id,
        error_message = %event.error.message,
        "Error recorded"
    );
}

/// Emits an audit event for an error marked as handled.
pub fn emit_error_handled(event: &ErrorEvent) {
    let audit = ErrorAuditEvent::from(event);
    tracing::info!(
        target: "resilience_engine::audit",
        event_type = audit.event_type(),
        event_id = %audit.event_id,
        service = %audit.service,
        resolution = ?audit.resolution,
        "Error marked as handled"
    );
}

/// Emits an audit event for a degradation strategy firing.
pub fn emit_strategy_triggered(
    strategy: &DegradationStrategy,
    event: &ErrorEvent,
    at: DateTime<Utc>,
) {
    let audit = StrategyTriggeredEvent::new(strategy, event, at);
    tracing::info!(
        target: "resilience_engine::audit",
        event_type = audit.event_type(),
        strategy_id = %audit.strategy_id,
        strategy = %audit.strategy_name,
        trigger = %audit.trigger,
        priority = %audit.priority,
        service = %audit.service,
        error_event_id = %audit.error_event_id,
        action_count = audit.action_count,
        "Executing degradation strategy"
    );
}

/// Emits an audit event for a generated report.
pub fn emit_report_generated(report: &ErrorReport) {
    let audit = ReportAuditEvent::from(report);
    tracing::info!(
        target: "resilience_engine::audit",
        event_type = audit.event_type(),
        report_id = %audit.report_id,
        period_start = %audit.period_start,
        period_end = %audit.period_end,
        total_errors = audit.total_errors,
        error_rate = audit.error_rate,
        critical_errors = audit.critical_errors,
        open_breakers = ?audit.open_breakers,
        "Error report generated"
    );
}
