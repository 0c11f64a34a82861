//! Registry of named circuit breakers.

use crate::audit;
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerEntry, CircuitBreakerState, Permit, Transition};
use crate::clock::{SharedClock, SystemClock};
use crate::core::{ServiceError, ServiceResult};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type SharedEntry = Arc<Mutex<BreakerEntry>>;

/// Owns one circuit breaker per logical operation name.
///
/// Breakers are created lazily on first use. Admission and outcome
/// recording for a name each happen under that name's lock, so concurrent
/// calls observe a single linear history of transitions. The lock is never
/// held while the protected operation runs.
///
/// # Example
///
/// ```rust,ignore
/// use resilience_engine::circuit_breaker::CircuitBreakerRegistry;
///
/// let registry = CircuitBreakerRegistry::new();
/// let value = registry
///     .execute("classifier", || async { Ok::<_, ServiceError>(42) }, None)
///     .await?;
/// ```
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, SharedEntry>,
    default_config: CircuitBreakerConfig,
    clock: SharedClock,
}

impl CircuitBreakerRegistry {
    /// Creates a registry with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default(), Arc::new(SystemClock))
    }

    /// Creates a registry with the given defaults and clock.
    pub fn with_config(default_config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            clock,
        }
    }

    /// Returns the configuration used when a call does not supply one.
    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Runs `operation` behind the breaker called `name`.
    ///
    /// Fails fast with [`ServiceError::CircuitOpen`] while the breaker is open
    /// and the recovery time has not passed; the operation is not invoked in
    /// that case. Otherwise the operation's own result is returned unchanged.
    pub async fn execute<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        config: Option<&CircuitBreakerConfig>,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let config = config.unwrap_or(&self.default_config);
        let entry = self.entry(name);

        let admitted = entry.lock().try_acquire(self.clock.now(), config);
        let permit = match admitted {
            Ok(permit) => permit,
            Err(retry_after) => {
                audit::emit_call_rejected(name, retry_after);
                return Err(ServiceError::CircuitOpen {
                    name: name.to_string(),
                    retry_after,
                });
            }
        };
        if let Some(transition) = permit.transition {
            self.announce(&entry, transition);
        }

        let mut in_flight = InFlight {
            entry: &entry,
            permit: Some(permit),
        };
        let started = Instant::now();
        let result = operation().await;
        let elapsed = started.elapsed();
        let permit = in_flight.complete();

        let now = self.clock.now();
        let transition = {
            let mut guard = entry.lock();
            match &result {
                Ok(_) => guard.on_success(now, elapsed, permit, config),
                Err(_) => guard.on_failure(now, elapsed, permit, config),
            }
        };

        if let Some(transition) = transition {
            self.announce(&entry, transition);
        }
        if elapsed > config.expected_response_time {
            tracing::debug!(
                breaker = %name,
                elapsed_ms = elapsed.as_millis() as u64,
                expected_ms = config.expected_response_time.as_millis() as u64,
                "Protected operation slower than expected"
            );
        }
        if let Err(error) = &result {
            tracing::debug!(
                breaker = %name,
                error = %error,
                elapsed_ms = elapsed.as_millis() as u64,
                "Protected operation failed"
            );
        }

        result
    }

    /// Returns a snapshot of the named breaker, if it exists.
    pub fn get(&self, name: &str) -> Option<CircuitBreakerState> {
        self.breakers
            .get(name)
            .map(|entry| entry.value().lock().state.clone())
    }

    /// Returns the mean duration of the named breaker's calls that completed
    /// within its monitoring window, or `None` if there were none.
    pub fn recent_response_time(&self, name: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.breakers
            .get(name)
            .and_then(|entry| entry.value().lock().recent_response_time(now))
    }

    /// Returns snapshots of every breaker, ordered by name.
    pub fn all(&self) -> Vec<CircuitBreakerState> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().lock().state.clone())
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Forces the named breaker closed and clears its failure streak.
    ///
    /// Returns `false` if no breaker has that name. Resetting an already
    /// closed breaker leaves it unchanged.
    pub fn reset(&self, name: &str) -> bool {
        let Some(entry) = self.breakers.get(name).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        let transition = entry.lock().reset();
        if let Some(transition) = transition {
            self.announce(&entry, transition);
        }
        tracing::info!(breaker = %name, "Circuit breaker manually reset");
        true
    }

    /// Removes the named breaker, returning its last state.
    pub fn remove(&self, name: &str) -> Option<CircuitBreakerState> {
        self.breakers
            .remove(name)
            .map(|(_, entry)| entry.lock().state.clone())
    }

    /// Returns the number of breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns `true` if no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn entry(&self, name: &str) -> SharedEntry {
        if let Some(entry) = self.breakers.get(name) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new(name))))
                .value(),
        )
    }

    fn announce(&self, entry: &SharedEntry, transition: Transition) {
        let snapshot = entry.lock().state.clone();
        audit::emit_breaker_transition(&snapshot, transition, self.clock.now());
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("default_config", &self.default_config)
            .finish()
    }
}

/// Returns an unfinished probe slot if the caller drops the future.
struct InFlight<'a> {
    entry: &'a SharedEntry,
    permit: Option<Permit>,
}

impl InFlight<'_> {
    fn complete(&mut self) -> Permit {
        self.permit.take().unwrap_or(Permit {
            probe: false,
            transition: None,
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.entry.lock().abandon(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitStatus;
    use crate::clock::{Clock, ManualClock};
    use crate::core::ErrorKind;
    use crate::mock::ScriptedOperation;

    fn registry(clock: &ManualClock) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::with_config(
            CircuitBreakerConfig::default(),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_passes_through_and_creates_breaker() {
        let registry = CircuitBreakerRegistry::new();
        let value = registry
            .execute("svc", || async { Ok::<_, ServiceError>(7) }, None)
            .await
            .unwrap();

        assert_eq!(value, 7);
        let state = registry.get("svc").unwrap();
        assert!(state.is_closed());
        assert_eq!(state.total_requests, 1);
        assert!(state.last_success_time.is_some());
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_invoking() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("svc", "reset"));

        for _ in 0..5 {
            let result = registry.execute("svc", || op.call(), None).await;
            assert!(matches!(result, Err(ServiceError::Network { .. })));
        }
        assert_eq!(registry.get("svc").unwrap().status, CircuitStatus::Open);

        let healthy = ScriptedOperation::always_succeeding("ok");
        let result = registry.execute("svc", || healthy.call(), None).await;
        assert!(matches!(result, Err(ServiceError::CircuitOpen { .. })));
        assert_eq!(healthy.calls(), 0);
        assert_eq!(op.calls(), 5);
    }

    #[tokio::test]
    async fn test_trial_call_after_recovery_timeout() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default().with_failure_threshold(1);
        let failing = ScriptedOperation::<()>::always_failing(ServiceError::internal("down"));
        let _ = registry.execute("svc", || failing.call(), Some(&config)).await;

        clock.advance(Duration::from_secs(29));
        let healthy = ScriptedOperation::always_succeeding(1);
        let early = registry.execute("svc", || healthy.call(), Some(&config)).await;
        assert!(matches!(early, Err(ServiceError::CircuitOpen { .. })));
        assert_eq!(healthy.calls(), 0);

        clock.advance(Duration::from_secs(1));
        let probe = registry.execute("svc", || healthy.call(), Some(&config)).await;
        assert_eq!(probe.unwrap(), 1);
        assert_eq!(healthy.calls(), 1);

        let state = registry.get("svc").unwrap();
        assert!(state.is_closed());
        assert_eq!(state.failure_count, 0);
    }

    #[tokio::test]
    async fn test_failed_trial_call_reopens_from_now() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default().with_failure_threshold(1);
        let failing = ScriptedOperation::<()>::always_failing(ServiceError::internal("down"));
        let _ = registry.execute("svc", || failing.call(), Some(&config)).await;

        clock.advance(Duration::from_secs(45));
        let retried_at = clock.now();
        let _ = registry.execute("svc", || failing.call(), Some(&config)).await;

        let state = registry.get("svc").unwrap();
        assert!(state.is_open());
        assert_eq!(
            state.next_attempt_time,
            Some(retried_at + chrono::Duration::seconds(30))
        );
        assert_eq!(failing.calls(), 2);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default().with_failure_threshold(1);
        let failing = ScriptedOperation::<()>::always_failing(ServiceError::internal("down"));
        let _ = registry.execute("svc", || failing.call(), Some(&config)).await;

        assert!(registry.reset("svc"));
        let first = registry.get("svc").unwrap();
        assert!(registry.reset("svc"));
        let second = registry.get("svc").unwrap();

        assert_eq!(first, second);
        assert!(second.is_closed());
        assert_eq!(second.failure_count, 0);
        assert!(second.next_attempt_time.is_none());
        assert!(!registry.reset("unknown"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_open_once() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let config = CircuitBreakerConfig::default().with_failure_threshold(5);

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let registry = Arc::clone(&registry);
            let config = config.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .execute(
                        "shared",
                        || async {
                            tokio::task::yield_now().await;
                            Err::<(), _>(ServiceError::network("shared", "reset"))
                        },
                        Some(&config),
                    )
                    .await
            }));
        }
        for task in tasks {
            let _ = task.await.unwrap();
        }

        let state = registry.get("shared").unwrap();
        assert!(state.is_open());
        assert_eq!(state.times_opened, 1);
        assert_eq!(state.total_requests, state.total_failures);
        assert!(state.total_failures >= 5);
    }

    #[tokio::test]
    async fn test_unbounded_recovery_timeout_keeps_rejecting() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_secs(u64::MAX));
        let failing = ScriptedOperation::<()>::always_failing(ServiceError::internal("down"));

        let result = registry.execute("svc", || failing.call(), Some(&config)).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal);
        assert!(registry.get("svc").unwrap().is_open());

        clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
        let healthy = ScriptedOperation::always_succeeding(());
        let rejected = registry.execute("svc", || healthy.call(), Some(&config)).await;
        assert!(matches!(
            rejected,
            Err(ServiceError::CircuitOpen { retry_after, .. })
                if retry_after == chrono::DateTime::<chrono::Utc>::MAX_UTC
        ));
        assert_eq!(healthy.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_response_time_follows_monitoring_window() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default().with_monitoring_window(Duration::from_secs(60));
        assert_eq!(registry.recent_response_time("svc"), None);

        registry
            .execute(
                "svc",
                || async {
                    tokio::time::sleep(Duration::from_secs(6)).await;
                    Ok::<_, ServiceError>(())
                },
                Some(&config),
            )
            .await
            .unwrap();
        let recent = registry.recent_response_time("svc").unwrap();
        assert!(recent >= Duration::from_secs(6) && recent < Duration::from_millis(6100));

        clock.advance(Duration::from_secs(61));
        assert_eq!(registry.recent_response_time("svc"), None);
        assert!(registry.get("svc").unwrap().average_response_time >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_all_sorted_and_remove() {
        let registry = CircuitBreakerRegistry::new();
        for name in ["b", "a", "c"] {
            let _ = registry
                .execute(name, || async { Ok::<_, ServiceError>(()) }, None)
                .await;
        }
        let names: Vec<_> = registry.all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert!(registry.remove("b").is_some());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("b").is_none());
    }

    #[tokio::test]
    async fn test_dropped_trial_call_releases_slot() {
        let clock = ManualClock::starting_now();
        let registry = registry(&clock);
        let config = CircuitBreakerConfig::default().with_failure_threshold(1);
        let failing = ScriptedOperation::<()>::always_failing(ServiceError::internal("down"));
        let _ = registry.execute("svc", || failing.call(), Some(&config)).await;
        clock.advance(Duration::from_secs(31));

        let pending = registry.execute(
            "svc",
            || std::future::pending::<ServiceResult<()>>(),
            Some(&config),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        let healthy = ScriptedOperation::always_succeeding(());
        registry
            .execute("svc", || healthy.call(), Some(&config))
            .await
            .unwrap();
        assert!(registry.get("svc").unwrap().is_closed());
    }
}
