//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts >= 1, timeouts > 0, rates in 0..=1)
//! - Detect duplicate policy names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::policy::Policy;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("policy name must not be empty")]
    EmptyName,

    #[error("duplicate policy '{0}'")]
    DuplicateName(String),

    #[error("{policy}: {field} {reason}")]
    InvalidField {
        policy: String,
        field: &'static str,
        reason: String,
    },

    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
}

fn invalid(policy: &Policy, field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        policy: policy.name.clone(),
        field,
        reason: reason.into(),
    }
}

/// Validate a single policy.
pub fn validate_policy(policy: &Policy) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if policy.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    if policy.max_attempts == 0 {
        errors.push(invalid(policy, "max_attempts", "must be at least 1"));
    }
    if policy.per_attempt_timeout_ms == 0 {
        errors.push(invalid(policy, "per_attempt_timeout_ms", "must be greater than 0"));
    }

    let backoff = &policy.backoff;
    if backoff.base_ms > backoff.cap_ms {
        errors.push(invalid(
            policy,
            "backoff.base_ms",
            format!("({}) must not exceed backoff.cap_ms ({})", backoff.base_ms, backoff.cap_ms),
        ));
    }
    if !(0.0..=1.0).contains(&backoff.jitter) {
        errors.push(invalid(policy, "backoff.jitter", "must be within 0.0..=1.0"));
    }

    let rate = &policy.rate_limit;
    if rate.capacity == 0 {
        errors.push(invalid(policy, "rate_limit.capacity", "must be at least 1"));
    }
    if !rate.refill_per_second.is_finite() || rate.refill_per_second <= 0.0 {
        errors.push(invalid(
            policy,
            "rate_limit.refill_per_second",
            "must be a positive finite number",
        ));
    }

    let breaker = &policy.breaker;
    if breaker.min_volume == 0 {
        errors.push(invalid(policy, "breaker.min_volume", "must be at least 1"));
    }
    if breaker.window_size < breaker.min_volume {
        errors.push(invalid(
            policy,
            "breaker.window_size",
            format!("({}) must be >= breaker.min_volume ({})", breaker.window_size, breaker.min_volume),
        ));
    }
    if !(0.0..=1.0).contains(&breaker.failure_rate_threshold) {
        errors.push(invalid(
            policy,
            "breaker.failure_rate_threshold",
            "must be within 0.0..=1.0",
        ));
    }
    if breaker.open_duration_ms == 0 {
        errors.push(invalid(policy, "breaker.open_duration_ms", "must be greater than 0"));
    }
    if breaker.half_open_trials == 0 {
        errors.push(invalid(policy, "breaker.half_open_trials", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a set of policies, including name uniqueness.
pub fn validate_policies(policies: &[Policy]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for policy in policies {
        if let Err(mut policy_errors) = validate_policy(policy) {
            errors.append(&mut policy_errors);
        }
        if !policy.name.is_empty() && !seen.insert(policy.name.as_str()) {
            errors.push(ValidationError::DuplicateName(policy.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a complete configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_policies(&config.policies) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
