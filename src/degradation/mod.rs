//! Policy-driven graceful degradation.
//!
//! A [`DegradationStrategy`] pairs a [`Trigger`] with an ordered list of
//! [`DegradationAction`]s. Every recorded error is evaluated against the
//! enabled strategies; when a trigger fires its actions run in order, and a
//! failing action is logged without stopping the ones after it.
//!
//! # Trigger semantics
//!
//! | Trigger        | Fires when                                                       |
//! |----------------|------------------------------------------------------------------|
//! | `ErrorRate`    | errors / max(requests, errors) for the service over the window ≥ threshold |
//! | `ResponseTime` | the service breaker's mean response time in ms ≥ threshold        |
//! | `CircuitOpen`  | the breaker named after the service is open                       |
//! | `Custom`       | the [`CustomTrigger`] registered for the strategy id says so      |

mod action;
mod engine;
mod mitigation;
mod strategy;

pub use action::{ActionContext, ActionHandler, ActionType, DegradationAction};
pub use engine::{CustomTrigger, DegradationEngine, TriggerContext};
pub use mitigation::{ActiveMitigation, BuiltinActionHandler, MitigationBoard};
pub use strategy::{
    default_strategies, DegradationStrategy, Priority, StrategyUpdate, Trigger, TriggerType,
    API_FALLBACK, CIRCUIT_BREAKER_FALLBACK, RESPONSE_TIME_DEGRADATION,
};
