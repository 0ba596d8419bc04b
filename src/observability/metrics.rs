//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_invocations_total` (counter): invocations by policy, outcome
//! - `gateway_invocation_duration_seconds` (histogram): end-to-end latency
//! - `gateway_attempts_total` (counter): attempts by policy, outcome
//! - `gateway_rejections_total` (counter): fail-fast rejections by policy, reason
//! - `gateway_breaker_transitions_total` (counter): by policy, from, to
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_policy_reloads_total` (counter): hot reloads by result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - The Prometheus exporter is only installed by the host binary

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::outcome::AttemptRecord;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_invocation_duration".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install()?;

    register_metric_descriptions();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "gateway_invocations_total",
        Unit::Count,
        "Total number of guarded invocations"
    );
    describe_histogram!(
        "gateway_invocation_duration_seconds",
        Unit::Seconds,
        "End-to-end invocation duration including retries"
    );
    describe_counter!(
        "gateway_attempts_total",
        Unit::Count,
        "Total number of attempts against downstream dependencies"
    );
    describe_counter!(
        "gateway_rejections_total",
        Unit::Count,
        "Calls rejected by rate limiting or an open circuit"
    );
    describe_counter!(
        "gateway_breaker_transitions_total",
        Unit::Count,
        "Circuit breaker state transitions"
    );
    describe_gauge!(
        "gateway_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "gateway_policy_reloads_total",
        Unit::Count,
        "Policy table reloads by result"
    );
}

pub fn record_invocation(policy: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gateway_invocations_total",
        "policy" => policy.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_invocation_duration_seconds", "policy" => policy.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(policy: &str, record: &AttemptRecord) {
    counter!(
        "gateway_attempts_total",
        "policy" => policy.to_string(),
        "outcome" => record.outcome.as_str()
    )
    .increment(1);
}

pub fn record_rejection(policy: &str, reason: &'static str) {
    counter!(
        "gateway_rejections_total",
        "policy" => policy.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_breaker_transition(policy: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "gateway_breaker_transitions_total",
        "policy" => policy.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(policy, to);
}

/// Export the current state so idle breakers show up before their first transition.
pub fn record_breaker_state(policy: &str, state: CircuitState) {
    gauge!("gateway_breaker_state", "policy" => policy.to_string()).set(state.as_gauge());
}

pub fn record_policy_reload(result: &'static str) {
    counter!("gateway_policy_reloads_total", "result" => result).increment(1);
}
