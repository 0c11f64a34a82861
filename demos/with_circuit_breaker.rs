//! Circuit breaker example demonstrating resilience patterns.
//!
//! This example shows how to:
//! - Protect a flaky downstream call with a circuit breaker
//! - Configure failure thresholds and recovery timeouts
//! - Record failures and see degradation strategies react
//! - Retry transient failures through the breaker
//! - Generate an error report
//!
//! Run with: cargo run --example with_circuit_breaker

use resilience_engine::logging::{init_tracing, LogFormat};
use resilience_engine::mock::ScriptedOperation;
use resilience_engine::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("resilience_engine=debug", LogFormat::Compact);

    println!("=== Circuit Breaker Example ===\n");

    let engine = ResilienceEngine::builder().build()?;

    // A classifier that fails four times, then recovers
    let mut script: Vec<ServiceResult<&str>> = (0..4)
        .map(|_| Err(ServiceError::unavailable("classifier", "503 from upstream")))
        .collect();
    script.push(Ok("article-8"));
    let classifier = ScriptedOperation::new(script);

    let cb_config = CircuitBreakerConfig::default()
        .with_failure_threshold(3)
        .with_recovery_timeout(Duration::from_secs(2));

    println!("Circuit Breaker Configuration:");
    println!("  Failure threshold: {}", cb_config.failure_threshold);
    println!("  Recovery timeout: {:?}", cb_config.recovery_timeout);
    println!();

    println!("Sending requests to trip the breaker...\n");

    for i in 1..=5 {
        let result = engine
            .execute_with_circuit_breaker("classifier", || classifier.call(), Some(&cb_config))
            .await;

        match &result {
            Ok(label) => println!("Request #{i}: success, label = {label}"),
            Err(ServiceError::CircuitOpen { name, retry_after }) => {
                println!("Request #{i}: circuit '{name}' open, retry after {retry_after}")
            }
            Err(e) => {
                println!("Request #{i}: failed: {e}");
                engine.record_error(
                    "classifier",
                    "classify",
                    e,
                    RequestContext::new().with_request_id(format!("req-{i}")),
                    e.default_severity(),
                );
            }
        }

        if let Some(state) = engine.circuit_breaker_state("classifier") {
            println!(
                "  State = {}, failures = {}, total = {}",
                state.status, state.failure_count, state.total_requests
            );
        }
    }

    println!("\nActive mitigations for 'classifier':");
    for mitigation in engine.active_mitigations("classifier") {
        println!(
            "  {} -> {} (strategy '{}')",
            mitigation.action_type, mitigation.target, mitigation.strategy_id
        );
    }

    println!("\nWaiting for the recovery timeout...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    // The first probe fails and reopens the breaker; the retry waits out
    // the recovery timeout and the second probe succeeds
    let policy = RetryPolicy::new()
        .with_max_attempts(3)
        .with_base_delay(Duration::from_millis(2500))
        .with_retryable_kind(ErrorKind::CircuitOpen);
    let result = engine
        .execute_resilient("classifier", || classifier.call(), Some(&policy), Some(&cb_config))
        .await;

    match result {
        Ok(label) => println!("Recovered: label = {label}"),
        Err(e) => println!("Still failing: {e}"),
    }
    println!("Operation invoked {} times in total", classifier.calls());

    if let Some(state) = engine.circuit_breaker_state("classifier") {
        println!("Final state: {} ({:.0}% success)", state.status, state.success_rate * 100.0);
    }

    println!("\n=== Error Report ===\n");
    let now = chrono::Utc::now();
    let report = engine.generate_error_report(ReportPeriod::ending_at(now, Duration::from_secs(3600)));
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!("\n=== Example Complete ===");
    Ok(())
}
