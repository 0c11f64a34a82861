//! Circuit breaker state machine.

use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::clock::saturating_after;
use crate::config::duration_ms;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// The current status of a circuit breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Circuit is closed; requests pass through normally.
    #[default]
    Closed,
    /// Circuit is open; requests are rejected until the recovery time.
    Open,
    /// Circuit is half-open; a limited number of probe requests pass.
    HalfOpen,
}

impl CircuitStatus {
    /// Returns the name of the status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of one named circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Breaker name; unique within a registry.
    pub name: String,

    /// Current status.
    pub status: CircuitStatus,

    /// Failures since the breaker last closed from half-open (or was reset).
    pub failure_count: u32,

    /// Completed calls over the breaker's lifetime.
    pub total_requests: u64,

    /// Failed calls over the breaker's lifetime.
    pub total_failures: u64,

    /// `(total_requests - total_failures) / total_requests`; 1.0 before any call.
    pub success_rate: f64,

    /// Mean duration of all completed calls.
    #[serde(rename = "average_response_time_ms", with = "duration_ms")]
    pub average_response_time: Duration,

    /// When the last failure completed.
    pub last_failure_time: Option<DateTime<Utc>>,

    /// When the last success completed.
    pub last_success_time: Option<DateTime<Utc>>,

    /// Earliest time a probe is admitted; only meaningful while open.
    pub next_attempt_time: Option<DateTime<Utc>>,

    /// Transitions into `Open` over the breaker's lifetime.
    #[serde(default)]
    pub times_opened: u64,
}

impl CircuitBreakerState {
    /// Creates a closed breaker with no history.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CircuitStatus::Closed,
            failure_count: 0,
            total_requests: 0,
            total_failures: 0,
            success_rate: 1.0,
            average_response_time: Duration::ZERO,
            last_failure_time: None,
            last_success_time: None,
            next_attempt_time: None,
            times_opened: 0,
        }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        self.status == CircuitStatus::Closed
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        self.status == CircuitStatus::Open
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        self.status == CircuitStatus::HalfOpen
    }

    fn record_completion(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.success_rate =
            (self.total_requests - self.total_failures) as f64 / self.total_requests as f64;

        let n = self.total_requests as f64;
        let mean = if self.total_requests == 1 {
            elapsed.as_secs_f64()
        } else {
            (self.average_response_time.as_secs_f64() * (n - 1.0) + elapsed.as_secs_f64()) / n
        };
        self.average_response_time = Duration::from_secs_f64(mean.max(0.0));
    }
}

/// A status change caused by a single call or operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before the change.
    pub from: CircuitStatus,
    /// Status after the change.
    pub to: CircuitStatus,
}

/// Permission to invoke the protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Permit {
    /// The call occupies a half-open probe slot.
    pub probe: bool,
    /// Set when admitting this call moved the breaker out of `Open`.
    pub transition: Option<Transition>,
}

/// Call durations that completed within one wall-clock second.
#[derive(Debug, Clone, Copy)]
struct ResponseBucket {
    second: i64,
    calls: u64,
    total: Duration,
}

/// Mutable per-name state guarded by the registry's entry lock.
#[derive(Debug)]
pub(crate) struct BreakerEntry {
    pub state: CircuitBreakerState,
    probes_in_flight: u32,
    recent: VecDeque<ResponseBucket>,
    monitoring_window: Duration,
}

impl BreakerEntry {
    pub fn new(name: &str) -> Self {
        Self {
            state: CircuitBreakerState::new(name),
            probes_in_flight: 0,
            recent: VecDeque::new(),
            monitoring_window: CircuitBreakerConfig::default().monitoring_window,
        }
    }

    /// Mean duration of calls that completed within the monitoring window
    /// ending at `now`, or `None` if there were none.
    pub fn recent_response_time(&self, now: DateTime<Utc>) -> Option<Duration> {
        let oldest = window_start(now, self.monitoring_window);
        let (calls, total) = self
            .recent
            .iter()
            .filter(|b| b.second >= oldest && b.second <= now.timestamp())
            .fold((0u64, Duration::ZERO), |(calls, total), b| {
                (calls + b.calls, total.saturating_add(b.total))
            });
        u32::try_from(calls)
            .ok()
            .filter(|&calls| calls > 0)
            .map(|calls| total / calls)
    }

    fn record_sample(&mut self, now: DateTime<Utc>, elapsed: Duration, config: &CircuitBreakerConfig) {
        self.monitoring_window = config.monitoring_window;
        let second = now.timestamp();
        match self.recent.back_mut() {
            Some(bucket) if bucket.second == second => {
                bucket.calls += 1;
                bucket.total = bucket.total.saturating_add(elapsed);
            }
            _ => self.recent.push_back(ResponseBucket {
                second,
                calls: 1,
                total: elapsed,
            }),
        }

        let oldest = window_start(now, self.monitoring_window);
        while self.recent.front().is_some_and(|b| b.second < oldest) {
            self.recent.pop_front();
        }
    }

    /// Decides whether a call may proceed.
    ///
    /// On rejection returns the time after which the caller may try again.
    pub fn try_acquire(
        &mut self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
    ) -> Result<Permit, DateTime<Utc>> {
        match self.state.status {
            CircuitStatus::Closed => Ok(Permit {
                probe: false,
                transition: None,
            }),

            CircuitStatus::Open => match self.state.next_attempt_time {
                Some(next) if now < next => Err(next),
                _ => {
                    self.state.status = CircuitStatus::HalfOpen;
                    self.probes_in_flight = 1;
                    Ok(Permit {
                        probe: true,
                        transition: Some(Transition {
                            from: CircuitStatus::Open,
                            to: CircuitStatus::HalfOpen,
                        }),
                    })
                }
            },

            CircuitStatus::HalfOpen => {
                if self.probes_in_flight < config.half_open_max_probes.max(1) {
                    self.probes_in_flight += 1;
                    Ok(Permit {
                        probe: true,
                        transition: None,
                    })
                } else {
                    Err(self.state.next_attempt_time.map_or(now, |t| t.max(now)))
                }
            }
        }
    }

    pub fn on_success(
        &mut self,
        now: DateTime<Utc>,
        elapsed: Duration,
        permit: Permit,
        config: &CircuitBreakerConfig,
    ) -> Option<Transition> {
        self.release(permit);
        self.state.last_success_time = Some(now);
        self.state.record_completion(elapsed);
        self.record_sample(now, elapsed, config);

        if self.state.status == CircuitStatus::HalfOpen {
            self.close();
            return Some(Transition {
                from: CircuitStatus::HalfOpen,
                to: CircuitStatus::Closed,
            });
        }
        None
    }

    pub fn on_failure(
        &mut self,
        now: DateTime<Utc>,
        elapsed: Duration,
        permit: Permit,
        config: &CircuitBreakerConfig,
    ) -> Option<Transition> {
        self.release(permit);
        self.state.last_failure_time = Some(now);
        self.state.failure_count = self.state.failure_count.saturating_add(1);
        self.state.total_failures += 1;
        self.state.record_completion(elapsed);
        self.record_sample(now, elapsed, config);

        let from = self.state.status;
        let should_open = match from {
            CircuitStatus::HalfOpen => true,
            CircuitStatus::Closed => self.state.failure_count >= config.failure_threshold,
            // A call admitted before another one opened the breaker.
            CircuitStatus::Open => false,
        };

        if should_open {
            self.state.status = CircuitStatus::Open;
            self.state.next_attempt_time = Some(saturating_after(now, config.recovery_timeout));
            self.state.times_opened += 1;
            self.probes_in_flight = 0;
            return Some(Transition {
                from,
                to: CircuitStatus::Open,
            });
        }
        None
    }

    /// Forces the breaker closed and clears the failure streak.
    pub fn reset(&mut self) -> Option<Transition> {
        let from = self.state.status;
        self.close();
        (from != CircuitStatus::Closed).then_some(Transition {
            from,
            to: CircuitStatus::Closed,
        })
    }

    /// Frees the probe slot of a call that never completed.
    pub fn abandon(&mut self, permit: Permit) {
        self.release(permit);
    }

    fn close(&mut self) {
        self.state.status = CircuitStatus::Closed;
        self.state.failure_count = 0;
        self.state.next_attempt_time = None;
        self.probes_in_flight = 0;
    }

    fn release(&mut self, permit: Permit) {
        if permit.probe {
            self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
        }
    }
}

/// First whole second still inside a window of `width` ending at `now`.
fn window_start(now: DateTime<Utc>, width: Duration) -> i64 {
    let width = i64::try_from(width.as_secs()).unwrap_or(i64::MAX);
    now.timestamp().saturating_sub(width)
}
