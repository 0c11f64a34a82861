//! Trigger evaluation and action dispatch.

use crate::audit;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::core::{ActionError, EngineError, EngineResult};
use crate::degradation::action::{ActionContext, ActionHandler, ActionType, DegradationAction};
use crate::degradation::mitigation::{BuiltinActionHandler, MitigationBoard};
use crate::degradation::strategy::{DegradationStrategy, StrategyUpdate, TriggerType};
use crate::telemetry::{ErrorEvent, ErrorTelemetryStore};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

/// Everything a trigger may look at.
#[derive(Clone, Copy)]
pub struct TriggerContext<'a> {
    /// The strategy being evaluated.
    pub strategy: &'a DegradationStrategy,
    /// The error event that caused the evaluation.
    pub event: &'a ErrorEvent,
    /// Recorded errors and traffic.
    pub telemetry: &'a ErrorTelemetryStore,
    /// Breaker states and response times.
    pub breakers: &'a CircuitBreakerRegistry,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// Decides whether a strategy with a custom trigger fires.
pub trait CustomTrigger: Send + Sync {
    /// Returns `true` if the strategy should run its actions.
    fn should_trigger(&self, ctx: &TriggerContext<'_>) -> bool;
}

/// Evaluates degradation strategies against recorded errors and runs the
/// actions of those that fire.
pub struct DegradationEngine {
    strategies: RwLock<Vec<DegradationStrategy>>,
    builtin: BuiltinActionHandler,
    mitigations: Arc<MitigationBoard>,
    action_handlers: DashMap<String, Arc<dyn ActionHandler>>,
    custom_triggers: DashMap<String, Arc<dyn CustomTrigger>>,
}

impl DegradationEngine {
    /// Creates an engine with no strategies.
    pub fn new() -> Self {
        Self::with_strategies(Vec::new())
    }

    /// Creates an engine with the given strategies.
    pub fn with_strategies(strategies: Vec<DegradationStrategy>) -> Self {
        let mitigations = Arc::new(MitigationBoard::new());
        Self {
            strategies: RwLock::new(strategies),
            builtin: BuiltinActionHandler::new(Arc::clone(&mitigations)),
            mitigations,
            action_handlers: DashMap::new(),
            custom_triggers: DashMap::new(),
        }
    }

    /// Returns the board the built-in actions post to.
    pub fn mitigations(&self) -> &Arc<MitigationBoard> {
        &self.mitigations
    }

    /// Registers the handler for custom actions with the given target.
    pub fn register_action_handler(
        &self,
        target: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) {
        self.action_handlers.insert(target.into(), handler);
    }

    /// Registers the trigger for the custom strategy with the given id.
    pub fn register_custom_trigger(
        &self,
        strategy_id: impl Into<String>,
        trigger: Arc<dyn CustomTrigger>,
    ) {
        self.custom_triggers.insert(strategy_id.into(), trigger);
    }

    /// Returns all strategies in insertion order.
    pub fn strategies(&self) -> Vec<DegradationStrategy> {
        self.strategies.read().clone()
    }

    /// Returns the strategy with the given id.
    pub fn strategy(&self, id: &str) -> Option<DegradationStrategy> {
        self.strategies.read().iter().find(|s| s.id == id).cloned()
    }

    /// Adds a strategy, replacing any with the same id.
    ///
    /// Returns the replaced strategy.
    pub fn add_strategy(&self, strategy: DegradationStrategy) -> Option<DegradationStrategy> {
        let mut strategies = self.strategies.write();
        match strategies.iter_mut().find(|s| s.id == strategy.id) {
            Some(existing) => Some(std::mem::replace(existing, strategy)),
            None => {
                strategies.push(strategy);
                None
            }
        }
    }

    /// Applies a partial update and returns the updated strategy.
    pub fn update_strategy(
        &self,
        id: &str,
        update: StrategyUpdate,
    ) -> EngineResult<DegradationStrategy> {
        let mut strategies = self.strategies.write();
        let strategy = strategies
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::StrategyNotFound { id: id.to_string() })?;
        update.apply_to(strategy);
        tracing::info!(
            strategy_id = %strategy.id,
            strategy = %strategy.name,
            enabled = strategy.enabled,
            "Degradation strategy updated"
        );
        Ok(strategy.clone())
    }

    /// Removes a strategy.
    pub fn remove_strategy(&self, id: &str) -> Option<DegradationStrategy> {
        let mut strategies = self.strategies.write();
        let index = strategies.iter().position(|s| s.id == id)?;
        Some(strategies.remove(index))
    }

    /// Evaluates every enabled strategy against `event`, highest priority
    /// first, and runs the actions of those that fire.
    ///
    /// Returns the ids of the strategies that fired. Action failures are
    /// logged and never returned.
    pub fn evaluate(
        &self,
        event: &ErrorEvent,
        telemetry: &ErrorTelemetryStore,
        breakers: &CircuitBreakerRegistry,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut candidates: Vec<_> = self
            .strategies
            .read()
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        candidates.sort_by_key(|s| Reverse(s.priority));

        let mut fired = Vec::new();
        for strategy in &candidates {
            let ctx = TriggerContext {
                strategy,
                event,
                telemetry,
                breakers,
                now,
            };
            if !self.should_trigger(&ctx) {
                continue;
            }

            audit::emit_strategy_triggered(strategy, event, now);
            self.execute_actions(strategy, event, now);
            fired.push(strategy.id.clone());
        }
        fired
    }

    fn should_trigger(&self, ctx: &TriggerContext<'_>) -> bool {
        let trigger = &ctx.strategy.trigger;
        let service = ctx.event.service.as_str();
        match trigger.trigger_type {
            TriggerType::ErrorRate => {
                let sample = ctx.telemetry.error_rate(Some(service), trigger.duration);
                sample.errors > 0 && sample.rate >= trigger.threshold
            }
            TriggerType::ResponseTime => {
                let threshold_ms = if trigger.threshold > 0.0 {
                    trigger.threshold
                } else {
                    ctx.breakers.default_config().expected_response_time.as_secs_f64() * 1000.0
                };
                ctx.breakers
                    .recent_response_time(service)
                    .map_or(false, |mean| mean.as_secs_f64() * 1000.0 >= threshold_ms)
            }
            TriggerType::CircuitOpen => ctx
                .breakers
                .get(service)
                .map_or(false, |state| state.is_open()),
            TriggerType::Custom => match self.custom_triggers.get(&ctx.strategy.id) {
                Some(custom) => custom.should_trigger(ctx),
                None => {
                    tracing::debug!(
                        strategy_id = %ctx.strategy.id,
                        "No custom trigger registered; strategy skipped"
                    );
                    false
                }
            },
        }
    }

    /// Runs the strategy's actions in order.
    ///
    /// Returns the number of actions that succeeded.
    pub fn execute_actions(
        &self,
        strategy: &DegradationStrategy,
        event: &ErrorEvent,
        now: DateTime<Utc>,
    ) -> usize {
        let ctx = ActionContext {
            strategy,
            event,
            now,
        };
        let mut succeeded = 0;
        for action in &strategy.actions {
            match self.run_action(&ctx, action) {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    tracing::error!(
                        strategy = %strategy.name,
                        action = %action.action_type,
                        target = %action.target,
                        service = %event.service,
                        error = %e,
                        "Failed to execute degradation action"
                    );
                }
            }
        }
        succeeded
    }

    fn run_action(
        &self,
        ctx: &ActionContext<'_>,
        action: &DegradationAction,
    ) -> Result<(), ActionError> {
        if action.action_type != ActionType::Custom {
            return self.builtin.execute(ctx, action);
        }
        let handler = self
            .action_handlers
            .get(&action.target)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| ActionError::NoHandler {
                target: action.target.clone(),
            })?;
        handler.execute(ctx, action)
    }
}

impl Default for DegradationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DegradationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DegradationEngine")
            .field("strategies", &self.strategies.read().len())
            .field("mitigations", &self.mitigations.len())
            .field("action_handlers", &self.action_handlers.len())
            .field("custom_triggers", &self.custom_triggers.len())
            .finish()
    }
}
