//! Degradation strategies and their triggers.

use crate::config::duration_ms;
use crate::degradation::action::DegradationAction;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Condition that fires a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Error ratio for the event's service over the window meets the threshold.
    ErrorRate,
    /// Average response time of the event's service (ms) meets the threshold.
    ResponseTime,
    /// The breaker named after the event's service is open.
    CircuitOpen,
    /// Decided by a registered [`CustomTrigger`](crate::degradation::CustomTrigger).
    Custom,
}

impl TriggerType {
    /// Returns the name of the trigger type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ErrorRate => "error_rate",
            Self::ResponseTime => "response_time",
            Self::CircuitOpen => "circuit_open",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When a strategy fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// What is measured.
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,

    /// Level at which the trigger fires (inclusive).
    pub threshold: f64,

    /// Trailing window the measurement covers.
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl Trigger {
    /// Fires when the error ratio over `window` reaches `threshold`.
    pub fn error_rate(threshold: f64, window: Duration) -> Self {
        Self {
            trigger_type: TriggerType::ErrorRate,
            threshold,
            duration: window,
        }
    }

    /// Fires when the average response time reaches `threshold_ms`.
    pub fn response_time(threshold_ms: f64, window: Duration) -> Self {
        Self {
            trigger_type: TriggerType::ResponseTime,
            threshold: threshold_ms,
            duration: window,
        }
    }

    /// Fires while the service's breaker is open.
    pub fn circuit_open() -> Self {
        Self {
            trigger_type: TriggerType::CircuitOpen,
            threshold: 1.0,
            duration: Duration::ZERO,
        }
    }

    /// Fires when the registered custom trigger says so.
    pub fn custom(threshold: f64, window: Duration) -> Self {
        Self {
            trigger_type: TriggerType::Custom,
            threshold,
            duration: window,
        }
    }
}

/// Relative importance of a strategy; higher priorities are evaluated first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Evaluated last.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Evaluated early.
    High,
    /// Evaluated first.
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A policy that substitutes reduced functionality once its trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationStrategy {
    /// Unique identifier.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// What the strategy is for.
    #[serde(default)]
    pub description: String,

    /// When it fires.
    pub trigger: Trigger,

    /// What it does, in order.
    #[serde(default)]
    pub actions: Vec<DegradationAction>,

    /// Evaluation order.
    #[serde(default)]
    pub priority: Priority,

    /// Disabled strategies are never evaluated.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl DegradationStrategy {
    /// Creates an enabled strategy without actions.
    pub fn new(id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            trigger,
            actions: Vec::new(),
            priority: Priority::default(),
            enabled: true,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends an action.
    pub fn with_action(mut self, action: DegradationAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables the strategy.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A partial change to a strategy. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New trigger.
    pub trigger: Option<Trigger>,
    /// New action list.
    pub actions: Option<Vec<DegradationAction>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New enabled flag.
    pub enabled: Option<bool>,
}

impl StrategyUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the strategy.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Changes the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the trigger.
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Replaces the actions.
    pub fn actions(mut self, actions: Vec<DegradationAction>) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Changes the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Enables or disables the strategy.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Applies the update in place.
    pub fn apply_to(self, strategy: &mut DegradationStrategy) {
        if let Some(name) = self.name {
            strategy.name = name;
        }
        if let Some(description) = self.description {
            strategy.description = description;
        }
        if let Some(trigger) = self.trigger {
            strategy.trigger = trigger;
        }
        if let Some(actions) = self.actions {
            strategy.actions = actions;
        }
        if let Some(priority) = self.priority {
            strategy.priority = priority;
        }
        if let Some(enabled) = self.enabled {
            strategy.enabled = enabled;
        }
    }
}

/// Id of the built-in error-rate fallback strategy.
pub const API_FALLBACK: &str = "api-fallback";
/// Id of the built-in response-time strategy.
pub const RESPONSE_TIME_DEGRADATION: &str = "response-time-degradation";
/// Id of the built-in circuit-open strategy.
pub const CIRCUIT_BREAKER_FALLBACK: &str = "circuit-breaker-fallback";

/// The strategies installed by default.
pub fn default_strategies() -> Vec<DegradationStrategy> {
    vec![
        DegradationStrategy::new(
            API_FALLBACK,
            Trigger::error_rate(0.1, Duration::from_secs(5 * 60)),
        )
        .with_name("API Fallback Strategy")
        .with_description("Use cached data when API is unavailable")
        .with_action(DegradationAction::fallback("cached_data").with_parameter("ttl", 3_600_000u64))
        .with_priority(Priority::High),
        DegradationStrategy::new(
            RESPONSE_TIME_DEGRADATION,
            Trigger::response_time(5000.0, Duration::from_secs(60)),
        )
        .with_name("Response Time Degradation")
        .with_description("Reduce response time by using simplified data")
        .with_action(
            DegradationAction::fallback("simplified_data")
                .with_parameter("fields", serde_json::json!(["id", "name", "status"])),
        )
        .with_priority(Priority::Medium),
        DegradationStrategy::new(CIRCUIT_BREAKER_FALLBACK, Trigger::circuit_open())
            .with_name("Circuit Breaker Fallback")
            .with_description("Use alternative service when circuit is open")
            .with_action(
                DegradationAction::redirect("backup_service")
                    .with_parameter("endpoint", "/api/backup"),
            )
            .with_priority(Priority::Critical),
    ]
}
