//! # Resilience Engine
//!
//! Circuit breakers, retries, error telemetry and graceful degradation for
//! services that call unreliable collaborators.
//!
//! ## Overview
//!
//! The engine sits between your code and the downstream services it calls
//! (classifiers, data providers, internal APIs). It lets you:
//!
//! - Fail fast while a collaborator is down, with per-name circuit breakers
//! - Retry transient failures with exponential backoff
//! - Record every failure with its request context and severity
//! - React to error rates, slow responses and open circuits with
//!   prioritized degradation strategies
//! - Summarize errors and breaker health in periodic reports
//! - Emit structured audit events for every state change
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resilience_engine::{ResilienceEngine, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ResilienceEngine::builder().build()?;
//!
//!     let label = engine
//!         .with_error_handling("classifier", "classify", RequestContext::new(), || {
//!             engine.execute_resilient("classifier", || classify(&doc), None, None)
//!         })
//!         .await?;
//!
//!     println!("classified as {label}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: error taxonomy, severities and request context
//! - **Circuit Breaker**: per-name breakers sharing one registry
//! - **Retry**: bounded retries with exponential backoff
//! - **Telemetry**: error events, traffic counts and error rates
//! - **Degradation**: strategies that fire on errors and post mitigations
//! - **Report**: periodic error summaries and report sinks
//! - **Engine**: the facade tying the above together
//! - **Scheduler**: background monitoring, eviction and reporting
//! - **Audit**: structured logging of state changes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod core;
pub mod degradation;
pub mod engine;
pub mod logging;
pub mod mock;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use crate::core::{
    ActionError, ConfigError, EngineError, EngineResult, ErrorKind, RequestContext, ServiceError,
    ServiceResult, Severity,
};

pub use crate::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerState, CircuitStatus,
};
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::EngineConfig;
pub use crate::degradation::{
    ActionType, DegradationAction, DegradationStrategy, Priority, StrategyUpdate, Trigger,
    TriggerType,
};
pub use crate::engine::{ResilienceEngine, ResilienceEngineBuilder};
pub use crate::report::{ErrorReport, ReportPeriod};
pub use crate::retry::RetryPolicy;
pub use crate::scheduler::{Scheduler, SchedulerHandle};
pub use crate::telemetry::{ErrorEvent, EventFilter};

/// Prelude module for convenient imports.
///
/// ```rust
/// use resilience_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerState, CircuitStatus};
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        EngineError, EngineResult, ErrorKind, RequestContext, ServiceError, ServiceResult,
        Severity,
    };
    pub use crate::degradation::{
        ActionHandler, DegradationAction, DegradationStrategy, Priority, StrategyUpdate, Trigger,
    };
    pub use crate::engine::ResilienceEngine;
    pub use crate::report::{ErrorReport, ReportPeriod};
    pub use crate::retry::RetryPolicy;
    pub use crate::telemetry::{ErrorEvent, EventFilter};
}
