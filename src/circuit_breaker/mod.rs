//! Circuit breakers for unreliable downstream collaborators.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! stopping traffic to failing collaborators and periodically probing them
//! to detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; requests pass through.
//! - **Open**: The collaborator is failing; requests are rejected immediately.
//! - **Half-Open**: Probing the collaborator to see if it has recovered.
//!
//! ```text
//! Closed --(failure_count >= threshold)--> Open
//! Open --(now >= next_attempt_time, next call)--> HalfOpen
//! HalfOpen --(success)--> Closed
//! HalfOpen --(failure)--> Open
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use resilience_engine::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
//! use std::time::Duration;
//!
//! let registry = CircuitBreakerRegistry::new();
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(30));
//!
//! let isin = registry
//!     .execute("compliance-db", || lookup_isin("LU0000000000"), Some(&config))
//!     .await?;
//! ```

mod config;
mod registry;
mod state;

pub use config::CircuitBreakerConfig;
pub use registry::CircuitBreakerRegistry;
pub use state::{CircuitBreakerState, CircuitStatus, Transition};
