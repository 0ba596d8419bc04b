//! Error types surfaced by the gateway.
//!
//! # Propagation
//! - `RateLimited` / `CircuitOpen`: admission rejections, never retried
//! - `Timeout` and retryable failures: retried until the budget runs out,
//!   then surfaced as `RetriesExhausted` carrying the last failure
//! - `Fatal`: caller-classified, surfaced on first occurrence
//! - `Cancelled`: caller's token fired at a suspension point

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::validation::ValidationError;

/// Failure reported by a wrapped operation for a single attempt.
///
/// The caller decides the classification: `Retryable` failures consume
/// retry budget, `Fatal` ones end the invocation immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    Retryable(E),
    Fatal(E),
}

impl<E> AttemptError<E> {
    pub fn retryable(error: E) -> Self {
        AttemptError::Retryable(error)
    }

    pub fn fatal(error: E) -> Self {
        AttemptError::Fatal(error)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, AttemptError::Fatal(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            AttemptError::Retryable(e) | AttemptError::Fatal(e) => e,
        }
    }
}

/// Why the last attempt of an exhausted invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LastFailure<E> {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("attempt failed: {0}")]
    Failed(E),

    /// The attempt task panicked or was aborted by the runtime.
    #[error("attempt aborted: {0}")]
    Aborted(String),
}

/// Errors returned by [`Gateway::invoke`](crate::gateway::Gateway::invoke).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError<E> {
    #[error("rate limit exceeded for policy '{policy}'")]
    RateLimited { policy: String },

    #[error("circuit open for policy '{policy}'")]
    CircuitOpen { policy: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: LastFailure<E> },

    #[error("invocation cancelled")]
    Cancelled,

    #[error("fatal error: {0}")]
    Fatal(E),

    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),
}

impl<E> GatewayError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            GatewayError::Cancelled => ErrorKind::Cancelled,
            GatewayError::Fatal(_) => ErrorKind::Fatal,
            GatewayError::UnknownPolicy(_) => ErrorKind::UnknownPolicy,
        }
    }

    /// True for fail-fast admission rejections that never reached the dependency.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::CircuitOpen { .. }
        )
    }

    /// True when the outcome was decided by a deadline, directly or as the
    /// last failure of an exhausted retry budget.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_)
                | GatewayError::RetriesExhausted {
                    last: LastFailure::Timeout(_),
                    ..
                }
        )
    }
}

/// Errors from the policy registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),

    #[error("policy '{0}' is already registered")]
    DuplicatePolicy(String),

    #[error("invalid policy: {}", join_errors(.0))]
    InvalidPolicy(Vec<ValidationError>),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::UnknownPolicy(_) => ErrorKind::UnknownPolicy,
            RegistryError::DuplicatePolicy(_) => ErrorKind::DuplicatePolicy,
            RegistryError::InvalidPolicy(_) => ErrorKind::InvalidPolicy,
        }
    }
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Flat classification of every error the gateway can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    CircuitOpen,
    Timeout,
    RetriesExhausted,
    Cancelled,
    Fatal,
    UnknownPolicy,
    DuplicatePolicy,
    InvalidPolicy,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Fatal => "fatal",
            ErrorKind::UnknownPolicy => "unknown_policy",
            ErrorKind::DuplicatePolicy => "duplicate_policy",
            ErrorKind::InvalidPolicy => "invalid_policy",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
