//! Bounded retry execution with exponential backoff.

use crate::core::ServiceResult;
use crate::retry::policy::RetryPolicy;

use dashmap::DashMap;
use std::future::Future;

/// Runs operations with bounded retries.
///
/// Policies resolve in this order: the policy passed to [`execute`], the
/// policy registered for the operation name with [`set_policy`], and
/// finally the executor default.
///
/// [`execute`]: RetryExecutor::execute
/// [`set_policy`]: RetryExecutor::set_policy
#[derive(Debug, Default)]
pub struct RetryExecutor {
    default_policy: RetryPolicy,
    service_policies: DashMap<String, RetryPolicy>,
}

impl RetryExecutor {
    /// Creates an executor with the given default policy.
    pub fn new(default_policy: RetryPolicy) -> Self {
        Self {
            default_policy,
            service_policies: DashMap::new(),
        }
    }

    /// Registers a policy for one service or operation name.
    pub fn set_policy(&self, service: impl Into<String>, policy: RetryPolicy) {
        let service = service.into();
        tracing::info!(
            service = %service,
            max_attempts = policy.max_attempts,
            base_delay_ms = policy.base_delay.as_millis() as u64,
            "Retry policy set"
        );
        self.service_policies.insert(service, policy);
    }

    /// Returns the policy that applies to `name` when no override is given.
    pub fn policy_for(&self, name: &str) -> RetryPolicy {
        self.service_policies
            .get(name)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the policy's attempts are exhausted.
    pub async fn execute<F, Fut, T>(
        &self,
        name: &str,
        operation: F,
        policy: Option<&RetryPolicy>,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        match policy {
            Some(policy) => retry_async(name, policy, operation).await,
            None => {
                let policy = self.policy_for(name);
                retry_async(name, &policy, operation).await
            }
        }
    }
}

/// Executes an async operation with retry logic.
///
/// The last error is returned unchanged once attempts run out; a
/// non-retryable error is returned after the attempt that produced it.
pub async fn retry_async<F, Fut, T>(
    name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !policy.is_retryable(&error) {
            tracing::debug!(
                operation = %name,
                attempt,
                kind = %error.kind(),
                "Non-retryable failure"
            );
            return Err(error);
        }

        if !policy.should_retry(attempt) {
            tracing::error!(
                operation = %name,
                attempts = attempt,
                error = %error,
                "Operation failed after exhausting retries"
            );
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::warn!(
            operation = %name,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServiceError;
    use crate::mock::ScriptedOperation;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_and_attempt_count() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10));
        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("api", "reset"));

        let started = Instant::now();
        let result = retry_async("api", &policy, || op.call()).await;

        assert!(matches!(result, Err(ServiceError::Network { .. })));
        assert_eq!(op.calls(), 5);

        let offsets: Vec<_> = op.call_times().iter().map(|t| *t - started).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(7),
                Duration::from_secs(15),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let mut policy = RetryPolicy::new();
        policy.max_attempts = 0;
        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("api", "reset"));

        let started = Instant::now();
        let result = retry_async("api", &policy, || op.call()).await;
        assert!(result.is_err());
        assert_eq!(op.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_after_one_attempt() {
        let op = ScriptedOperation::<()>::always_failing(ServiceError::validation("bad"));
        let result = retry_async("api", &RetryPolicy::default(), || op.call()).await;

        assert!(matches!(result, Err(ServiceError::Validation { .. })));
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let op = ScriptedOperation::new(vec![
            Err(ServiceError::timeout("api", Duration::from_secs(5))),
            Err(ServiceError::unavailable("api", "503")),
            Ok("classified"),
        ]);
        let result = retry_async("api", &RetryPolicy::default(), || op.call()).await;

        assert_eq!(result.unwrap(), "classified");
        assert_eq!(op.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_policy_precedence() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        executor.set_policy("flaky", RetryPolicy::new().with_max_attempts(5));

        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("flaky", "x"));
        let _ = executor.execute("flaky", || op.call(), None).await;
        assert_eq!(op.calls(), 5);

        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("flaky", "x"));
        let _ = executor
            .execute("flaky", || op.call(), Some(&RetryPolicy::no_retry()))
            .await;
        assert_eq!(op.calls(), 1);

        let op = ScriptedOperation::<()>::always_failing(ServiceError::network("other", "x"));
        let _ = executor.execute("other", || op.call(), None).await;
        assert_eq!(op.calls(), 3);
    }
}
