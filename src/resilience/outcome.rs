//! Per-attempt outcome records.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Classified result of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
    /// Caller-classified non-retryable error; the dependency did answer.
    Fatal,
    /// Refused by the circuit breaker before dispatch.
    Rejected,
}

impl AttemptOutcome {
    /// Outcomes that count against the dependency's health.
    pub fn is_failure(&self) -> bool {
        matches!(self, AttemptOutcome::Failure | AttemptOutcome::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure => "failure",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Fatal => "fatal",
            AttemptOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral record of one attempt, consumed by logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number within the invocation.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}
