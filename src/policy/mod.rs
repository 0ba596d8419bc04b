//! Resilience policies.
//!
//! # Data Flow
//! ```text
//! config file / programmatic registration
//!     → validation (all errors reported at once)
//!     → registry.rs (atomic swap of the policy table)
//!     → Gateway::invoke pins an Arc<Policy> for the whole call sequence
//! ```
//!
//! # Design Decisions
//! - Every policy field is explicit; only `backoff.jitter` has a default
//! - Durations are stored as milliseconds (config friendly), exposed as `Duration`
//! - A policy never changes in place; replacement swaps the whole value

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod registry;

pub use registry::PolicyRegistry;

/// Resilience policy for one downstream dependency.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Policy {
    /// Dependency key, unique within a registry.
    pub name: String,

    /// Maximum number of attempts per invocation (>= 1).
    pub max_attempts: u32,

    /// Deadline for a single attempt in milliseconds.
    pub per_attempt_timeout_ms: u64,

    pub backoff: BackoffPolicy,

    pub rate_limit: RateLimitPolicy,

    pub breaker: BreakerPolicy,
}

impl Policy {
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }
}

/// Shape of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Always `base`.
    Fixed,
    /// `base * 2^(attempt-1)`, capped at `cap`.
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,

    /// Base delay in milliseconds.
    pub base_ms: u64,

    /// Upper bound for the computed delay in milliseconds.
    pub cap_ms: u64,

    /// Extra random delay as a fraction of the computed delay (0 disables).
    #[serde(default)]
    pub jitter: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitPolicy {
    /// Bucket capacity (burst size).
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BreakerPolicy {
    /// Number of most recent outcomes kept in the rolling window.
    pub window_size: u32,

    /// Minimum outcomes in the window before the failure rate is evaluated.
    pub min_volume: u32,

    /// Failure rate (0.0..=1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,

    /// Time spent in Open before a trial call is let through.
    pub open_duration_ms: u64,

    /// Consecutive successful trials required to close from HalfOpen.
    pub half_open_trials: u32,
}

impl BreakerPolicy {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A permissive policy used across unit tests.
    pub fn policy(name: &str) -> Policy {
        Policy {
            name: name.to_string(),
            max_attempts: 3,
            per_attempt_timeout_ms: 1_000,
            backoff: BackoffPolicy {
                kind: BackoffKind::Exponential,
                base_ms: 10,
                cap_ms: 1_000,
                jitter: 0.0,
            },
            rate_limit: RateLimitPolicy {
                capacity: 100,
                refill_per_second: 100.0,
            },
            breaker: BreakerPolicy {
                window_size: 10,
                min_volume: 5,
                failure_rate_threshold: 0.5,
                open_duration_ms: 1_000,
                half_open_trials: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_toml() {
        let policy: Policy = toml::from_str(
            r#"
            name = "inventory"
            max_attempts = 3
            per_attempt_timeout_ms = 250

            [backoff]
            kind = "exponential"
            base_ms = 10
            cap_ms = 500

            [rate_limit]
            capacity = 20
            refill_per_second = 5.0

            [breaker]
            window_size = 20
            min_volume = 5
            failure_rate_threshold = 0.5
            open_duration_ms = 30000
            half_open_trials = 2
            "#,
        )
        .unwrap();

        assert_eq!(policy.name, "inventory");
        assert_eq!(policy.backoff.kind, BackoffKind::Exponential);
        assert_eq!(policy.backoff.jitter, 0.0);
        assert_eq!(policy.per_attempt_timeout(), Duration::from_millis(250));
        assert_eq!(policy.breaker.open_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_policy_requires_explicit_fields() {
        let result: Result<Policy, _> = toml::from_str(
            r#"
            name = "inventory"
            max_attempts = 3
            "#,
        );
        assert!(result.is_err());
    }
}
