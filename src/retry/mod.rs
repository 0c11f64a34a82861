//! Bounded retries with exponential backoff.
//!
//! Retries are independent of circuit breakers; the engine composes the two
//! when a caller wants both.

mod executor;
mod policy;

pub use executor::{retry_async, RetryExecutor};
pub use policy::RetryPolicy;
