//! Structured audit logging.
//!
//! Breaker transitions, recorded errors, strategy triggers and generated
//! reports are emitted as `tracing` events with the target
//! `resilience_engine::audit`, so a subscriber can route them to a separate
//! sink (JSON file, OpenTelemetry, etc.). The event structs are also
//! serializable for callers that persist audit records themselves.

mod events;

pub use events::{
    emit_breaker_transition, emit_call_rejected, emit_error_handled, emit_error_recorded,
    emit_report_generated, emit_strategy_triggered, AuditEvent, BreakerTransitionEvent,
    ErrorAuditEvent, ReportAuditEvent, StrategyTriggeredEvent,
};
