//! Degradation actions and their handlers.

use crate::core::ActionError;
use crate::degradation::strategy::DegradationStrategy;
use crate::telemetry::ErrorEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// What a degradation action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Serve substitute or simplified data instead of the live result.
    Fallback,
    /// Serve cached data.
    Cache,
    /// Shorten downstream timeouts.
    Timeout,
    /// Send callers to a backup target.
    Redirect,
    /// Delegated to a registered handler.
    Custom,
}

impl ActionType {
    /// Returns the name of the action type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fallback => "fallback",
            Self::Cache => "cache",
            Self::Timeout => "timeout",
            Self::Redirect => "redirect",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of a degradation strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationAction {
    /// What the action does.
    #[serde(rename = "type")]
    pub action_type: ActionType,

    /// What it acts on (a data source, a backup service, a handler key).
    pub target: String,

    /// Free-form parameters, interpreted by the handler.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl DegradationAction {
    /// Creates an action without parameters.
    pub fn new(action_type: ActionType, target: impl Into<String>) -> Self {
        Self {
            action_type,
            target: target.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a fallback action.
    pub fn fallback(target: impl Into<String>) -> Self {
        Self::new(ActionType::Fallback, target)
    }

    /// Creates a cache action.
    pub fn cache(target: impl Into<String>) -> Self {
        Self::new(ActionType::Cache, target)
    }

    /// Creates a timeout action that shortens the target's timeout.
    pub fn timeout(target: impl Into<String>, timeout: Duration) -> Self {
        Self::new(ActionType::Timeout, target)
            .with_parameter("timeout_ms", timeout.as_millis() as u64)
    }

    /// Creates a redirect action.
    pub fn redirect(target: impl Into<String>) -> Self {
        Self::new(ActionType::Redirect, target)
    }

    /// Creates a custom action dispatched to the handler registered for
    /// `target`.
    pub fn custom(target: impl Into<String>) -> Self {
        Self::new(ActionType::Custom, target)
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Reads an optional non-negative integer parameter.
    pub fn u64_parameter(&self, name: &str) -> Result<Option<u64>, ActionError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                self.invalid(name, format!("expected a non-negative integer, got {value}"))
            }),
        }
    }

    /// Reads an optional string parameter.
    pub fn str_parameter(&self, name: &str) -> Result<Option<&str>, ActionError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(name, format!("expected a string, got {value}"))),
        }
    }

    pub(crate) fn invalid(&self, name: &str, reason: impl Into<String>) -> ActionError {
        ActionError::InvalidParameter {
            target: self.target.clone(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// What an action handler gets to see.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// The strategy whose trigger fired.
    pub strategy: &'a DegradationStrategy,
    /// The error event that caused the evaluation.
    pub event: &'a ErrorEvent,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// Carries out degradation actions.
///
/// Handlers run synchronously inside error recording, so they should only
/// flip state (a flag, a routing entry) and return quickly.
///
/// # Example
///
/// ```rust
/// use resilience_engine::degradation::{ActionContext, ActionHandler, DegradationAction};
/// use resilience_engine::ActionError;
///
/// struct PageOnCall;
///
/// impl ActionHandler for PageOnCall {
///     fn execute(&self, ctx: &ActionContext<'_>, action: &DegradationAction) -> Result<(), ActionError> {
///         tracing::warn!(service = %ctx.event.service, target = %action.target, "paging on-call");
///         Ok(())
///     }
/// }
/// ```
pub trait ActionHandler: Send + Sync {
    /// Runs the action.
    fn execute(&self, ctx: &ActionContext<'_>, action: &DegradationAction) -> Result<(), ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_accessors() {
        let action = DegradationAction::fallback("cached_data")
            .with_parameter("ttl", 3_600_000u64)
            .with_parameter("endpoint", "/api/backup");

        assert_eq!(action.u64_parameter("ttl").unwrap(), Some(3_600_000));
        assert_eq!(action.str_parameter("endpoint").unwrap(), Some("/api/backup"));
        assert_eq!(action.u64_parameter("missing").unwrap(), None);
        assert!(matches!(
            action.u64_parameter("endpoint"),
            Err(ActionError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_timeout_constructor() {
        let action = DegradationAction::timeout("classifier", Duration::from_millis(1500));
        assert_eq!(action.action_type, ActionType::Timeout);
        assert_eq!(action.u64_parameter("timeout_ms").unwrap(), Some(1500));
    }

    #[test]
    fn test_serde_shape() {
        let action = DegradationAction::redirect("backup_service").with_parameter("endpoint", "/b");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "redirect");
        assert_eq!(json["parameters"]["endpoint"], "/b");
    }
}
