//! The resilience engine facade.

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerState};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::core::{EngineError, EngineResult, RequestContext, ServiceError, ServiceResult, Severity};
use crate::degradation::{
    default_strategies, ActionHandler, ActiveMitigation, CustomTrigger, DegradationEngine,
    DegradationStrategy, StrategyUpdate,
};
use crate::report::{ErrorReport, LogReportSink, ReportGenerator, ReportPeriod, ReportSink};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::telemetry::{ErrorEvent, ErrorTelemetryStore, EventFilter, RateSample};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Builder for creating a [`ResilienceEngine`].
pub struct ResilienceEngineBuilder {
    config: EngineConfig,
    clock: Option<SharedClock>,
    report_sink: Option<Arc<dyn ReportSink>>,
    strategies: Vec<DegradationStrategy>,
    action_handlers: Vec<(String, Arc<dyn ActionHandler>)>,
    custom_triggers: Vec<(String, Arc<dyn CustomTrigger>)>,
}

impl ResilienceEngineBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: None,
            report_sink: None,
            strategies: Vec::new(),
            action_handlers: Vec::new(),
            custom_triggers: Vec::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock. Defaults to the system clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets where periodic reports go. Defaults to [`LogReportSink`].
    pub fn with_report_sink<S: ReportSink + 'static>(mut self, sink: S) -> Self {
        self.report_sink = Some(Arc::new(sink));
        self
    }

    /// Sets a shared report sink.
    pub fn with_arc_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    /// Adds a degradation strategy, replacing a default one with the same id.
    pub fn add_strategy(mut self, strategy: DegradationStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Registers the handler for custom actions with the given target.
    pub fn with_action_handler<H: ActionHandler + 'static>(
        mut self,
        target: impl Into<String>,
        handler: H,
    ) -> Self {
        self.action_handlers.push((target.into(), Arc::new(handler)));
        self
    }

    /// Registers the trigger for the custom strategy with the given id.
    pub fn with_custom_trigger<T: CustomTrigger + 'static>(
        mut self,
        strategy_id: impl Into<String>,
        trigger: T,
    ) -> Self {
        self.custom_triggers
            .push((strategy_id.into(), Arc::new(trigger)));
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> EngineResult<ResilienceEngine> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = self
            .report_sink
            .unwrap_or_else(|| Arc::new(LogReportSink));
        let engine = ResilienceEngine::assemble(self.config, clock, sink);

        for strategy in self.strategies {
            engine.degradation.add_strategy(strategy);
        }
        for (target, handler) in self.action_handlers {
            engine.degradation.register_action_handler(target, handler);
        }
        for (strategy_id, trigger) in self.custom_triggers {
            engine.degradation.register_custom_trigger(strategy_id, trigger);
        }

        tracing::info!(
            failure_threshold = engine.config.circuit_breaker.failure_threshold,
            recovery_timeout_ms = engine.config.circuit_breaker.recovery_timeout.as_millis() as u64,
            max_attempts = engine.config.retry.max_attempts,
            strategies = engine.degradation.strategies().len(),
            report_sink = %engine.report_sink.name(),
            "Resilience engine initialized"
        );
        Ok(engine)
    }
}

impl Default for ResilienceEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Protects calls to unreliable collaborators and records what goes wrong.
///
/// The engine owns one breaker registry, one retry executor, one telemetry
/// store and one degradation engine. It is meant to be created once at the
/// composition root and shared behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use resilience_engine::{ResilienceEngine, RequestContext, Severity};
///
/// let engine = ResilienceEngine::builder().build()?;
/// let result = engine
///     .execute_with_circuit_breaker("classifier", || classify(doc), None)
///     .await;
/// if let Err(e) = &result {
///     engine.record_error("classifier", "classify", e, RequestContext::new(), Severity::High);
/// }
/// ```
pub struct ResilienceEngine {
    config: EngineConfig,
    clock: SharedClock,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryExecutor,
    telemetry: Arc<ErrorTelemetryStore>,
    degradation: DegradationEngine,
    reports: ReportGenerator,
    report_sink: Arc<dyn ReportSink>,
}

impl ResilienceEngine {
    /// Creates a new builder.
    pub fn builder() -> ResilienceEngineBuilder {
        ResilienceEngineBuilder::new()
    }

    /// Creates an engine with default configuration and the system clock.
    pub fn new() -> Self {
        Self::assemble(
            EngineConfig::default(),
            Arc::new(SystemClock),
            Arc::new(LogReportSink),
        )
    }

    fn assemble(config: EngineConfig, clock: SharedClock, report_sink: Arc<dyn ReportSink>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::with_config(
            config.circuit_breaker.clone(),
            Arc::clone(&clock),
        ));
        let telemetry = Arc::new(ErrorTelemetryStore::with_config(
            config.telemetry.clone(),
            Arc::clone(&clock),
        ));
        let strategies = if config.degradation.install_defaults {
            default_strategies()
        } else {
            Vec::new()
        };

        Self {
            retry: RetryExecutor::new(config.retry.clone()),
            degradation: DegradationEngine::with_strategies(strategies),
            reports: ReportGenerator::new(
                Arc::clone(&telemetry),
                Arc::clone(&breakers),
                Arc::clone(&clock),
            ),
            breakers,
            telemetry,
            report_sink,
            clock,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Returns the breaker registry.
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Returns the telemetry store.
    pub fn telemetry(&self) -> &ErrorTelemetryStore {
        &self.telemetry
    }

    /// Returns the degradation engine.
    pub fn degradation(&self) -> &DegradationEngine {
        &self.degradation
    }

    // ---------------------------------------------------------------------
    // Protected execution
    // ---------------------------------------------------------------------

    /// Runs `operation` behind the circuit breaker called `name`.
    ///
    /// Calls that reach the operation are counted as traffic for `name`;
    /// calls rejected by an open breaker are not.
    pub async fn execute_with_circuit_breaker<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        config: Option<&CircuitBreakerConfig>,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.breakers
            .execute(
                name,
                || {
                    self.telemetry.record_request(name);
                    operation()
                },
                config,
            )
            .await
    }

    /// Runs `operation` with bounded retries.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        policy: Option<&RetryPolicy>,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.retry.execute(name, operation, policy).await
    }

    /// Retries a call that is itself protected by the breaker `name`.
    ///
    /// Each attempt goes through the breaker. A rejection by an open breaker
    /// is only retried if the policy lists `CircuitOpen` as retryable.
    pub async fn execute_resilient<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        policy: Option<&RetryPolicy>,
        config: Option<&CircuitBreakerConfig>,
    ) -> ServiceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let operation = &operation;
        self.retry
            .execute(
                name,
                move || self.execute_with_circuit_breaker(name, move || operation(), config),
                policy,
            )
            .await
    }

    /// Sets the retry policy used for `service` when no policy is passed.
    pub fn set_retry_policy(&self, service: impl Into<String>, policy: RetryPolicy) {
        self.retry.set_policy(service, policy);
    }

    /// Runs `operation` and records its error, if any, before returning it.
    ///
    /// The severity is the default for the error's kind.
    pub async fn with_error_handling<F, Fut, T>(
        &self,
        service: &str,
        operation_name: &str,
        context: RequestContext,
        operation: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let result = operation().await;
        if let Err(error) = &result {
            self.record_error(
                service,
                operation_name,
                error,
                context,
                error.default_severity(),
            );
        }
        result
    }

    // ---------------------------------------------------------------------
    // Telemetry
    // ---------------------------------------------------------------------

    /// Records a failure and evaluates degradation strategies against it.
    pub fn record_error(
        &self,
        service: &str,
        operation: &str,
        error: &ServiceError,
        context: RequestContext,
        severity: Severity,
    ) -> ErrorEvent {
        let event = self
            .telemetry
            .record(service, operation, error, context, severity);
        let fired = self.degradation.evaluate(
            &event,
            &self.telemetry,
            &self.breakers,
            self.clock.now(),
        );
        if !fired.is_empty() {
            tracing::debug!(
                service = %service,
                strategies = ?fired,
                "Degradation strategies triggered"
            );
        }
        event
    }

    /// Returns recorded errors matching `filter`, newest first.
    pub fn error_events(&self, filter: &EventFilter) -> Vec<ErrorEvent> {
        self.telemetry.query(filter)
    }

    /// Marks a recorded error as handled.
    pub fn mark_error_as_handled(
        &self,
        id: Uuid,
        resolution: Option<String>,
    ) -> EngineResult<ErrorEvent> {
        self.telemetry.mark_handled(id, resolution)
    }

    // ---------------------------------------------------------------------
    // Circuit breakers
    // ---------------------------------------------------------------------

    /// Returns a snapshot of the named breaker.
    pub fn circuit_breaker_state(&self, name: &str) -> Option<CircuitBreakerState> {
        self.breakers.get(name)
    }

    /// Returns snapshots of every breaker, ordered by name.
    pub fn all_circuit_breakers(&self) -> Vec<CircuitBreakerState> {
        self.breakers.all()
    }

    /// Forces the named breaker closed. Returns `false` if it does not exist.
    pub fn reset_circuit_breaker(&self, name: &str) -> bool {
        self.breakers.reset(name)
    }

    // ---------------------------------------------------------------------
    // Degradation
    // ---------------------------------------------------------------------

    /// Returns every degradation strategy.
    pub fn degradation_strategies(&self) -> Vec<DegradationStrategy> {
        self.degradation.strategies()
    }

    /// Applies a partial update to a strategy.
    pub fn update_degradation_strategy(
        &self,
        id: &str,
        update: StrategyUpdate,
    ) -> EngineResult<DegradationStrategy> {
        self.degradation.update_strategy(id, update)
    }

    /// Adds a strategy, replacing any with the same id.
    pub fn add_degradation_strategy(
        &self,
        strategy: DegradationStrategy,
    ) -> Option<DegradationStrategy> {
        self.degradation.add_strategy(strategy)
    }

    /// Returns the mitigations currently in effect for `service`.
    pub fn active_mitigations(&self, service: &str) -> Vec<ActiveMitigation> {
        self.degradation
            .mitigations()
            .active_for(service, self.clock.now())
    }

    /// Lifts every mitigation for `service`.
    pub fn clear_mitigations(&self, service: &str) -> usize {
        let cleared = self.degradation.mitigations().clear(service);
        tracing::info!(service = %service, cleared, "Mitigations cleared");
        cleared
    }

    // ---------------------------------------------------------------------
    // Reporting and housekeeping
    // ---------------------------------------------------------------------

    /// Builds an error report for `period`.
    pub fn generate_error_report(&self, period: ReportPeriod) -> ErrorReport {
        self.reports.generate(period)
    }

    /// Checks the overall error rate and warns above the threshold.
    pub fn run_rate_monitor(&self) -> RateSample {
        self.telemetry.monitor_rate()
    }

    /// Evicts expired telemetry and lapsed mitigations.
    ///
    /// Returns the number of error events removed.
    pub fn evict_expired(&self) -> usize {
        let removed = self.telemetry.evict();
        let lapsed = self
            .degradation
            .mitigations()
            .purge_expired(self.clock.now());
        if removed > 0 || lapsed > 0 {
            tracing::info!(
                events = removed,
                mitigations = lapsed,
                "Expired telemetry evicted"
            );
        }
        removed
    }

    /// Generates a report over the configured lookback and hands it to the
    /// report sink.
    pub async fn publish_periodic_report(&self) -> EngineResult<ErrorReport> {
        let period = ReportPeriod::ending_at(self.clock.now(), self.config.scheduler.report_lookback);
        let report = self.reports.generate(period);
        self.report_sink
            .publish(&report)
            .await
            .map_err(|e| match e {
                EngineError::ReportDelivery { .. } => e,
                other => EngineError::ReportDelivery {
                    sink: self.report_sink.name().to_string(),
                    message: other.to_string(),
                },
            })?;
        Ok(report)
    }
}

impl Default for ResilienceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResilienceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceEngine")
            .field("breakers", &self.breakers.len())
            .field("events", &self.telemetry.len())
            .field("degradation", &self.degradation)
            .field("report_sink", &self.report_sink.name())
            .finish()
    }
}
