//! Scriptable operations for tests and demos.
//!
//! A [`ScriptedOperation`] stands in for a downstream collaborator: it plays
//! back a fixed sequence of outcomes, counts how often it was invoked and
//! remembers when each invocation started.
//!
//! # Examples
//!
//! ```rust
//! use resilience_engine::mock::ScriptedOperation;
//! use resilience_engine::ServiceError;
//!
//! // Fails twice with a network error, then succeeds forever.
//! let op = ScriptedOperation::new(vec![
//!     Err(ServiceError::network("classifier", "connection reset")),
//!     Err(ServiceError::network("classifier", "connection reset")),
//!     Ok("article-8"),
//! ]);
//! assert_eq!(op.calls(), 0);
//! ```

use crate::core::{ServiceError, ServiceResult};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// A downstream call with a scripted sequence of outcomes.
///
/// Once the script runs out, the last outcome repeats.
#[derive(Debug)]
pub struct ScriptedOperation<T> {
    script: Mutex<VecDeque<ServiceResult<T>>>,
    last: Mutex<Option<ServiceResult<T>>>,
    latency: Option<Duration>,
    calls: AtomicU64,
    call_times: Mutex<Vec<Instant>>,
}

impl<T: Clone> ScriptedOperation<T> {
    /// Creates an operation that plays back `script` in order.
    pub fn new(script: Vec<ServiceResult<T>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            latency: None,
            calls: AtomicU64::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Creates an operation that always returns `value`.
    pub fn always_succeeding(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Creates an operation that always fails with `error`.
    pub fn always_failing(error: ServiceError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Makes every invocation take `latency` before returning.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Invokes the operation.
    pub async fn call(&self) -> ServiceResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.next_outcome()
    }

    /// Returns the number of invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns when each invocation started.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    fn next_outcome(&self) -> ServiceResult<T> {
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(ServiceError::internal("scripted operation has no outcomes"))),
        }
    }
}
