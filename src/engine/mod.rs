//! The engine facade.
//!
//! [`ResilienceEngine`] ties the circuit breakers, retry executor, error
//! telemetry, degradation strategies and reports together behind one API.

mod resilience_engine;

pub use resilience_engine::{ResilienceEngine, ResilienceEngineBuilder};

#[cfg(test)]
mod scenarios;
