//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the wall-clock duration of a single attempt
//! - Race the attempt against the caller's cancellation token
//!
//! # Design Decisions
//! - The attempt runs as its own task; the guard awaits its join handle
//! - On deadline the handle is dropped: the task is detached and its result
//!   discarded, the guard never waits for the callee to cooperate
//! - A panicking attempt surfaces as `Aborted`, never as a panic in the caller

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{AttemptError, GatewayError, LastFailure};

/// Verdict of one guarded attempt.
#[derive(Debug)]
pub enum GuardResult<T, E> {
    /// The attempt finished before the deadline.
    Completed(Result<T, AttemptError<E>>),
    /// The deadline expired first; the attempt was abandoned.
    TimedOut(Duration),
    /// The caller's token fired first.
    Cancelled,
    /// The attempt task panicked or was aborted.
    Aborted(String),
}

/// Deadline wrapper for a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `attempt` under the deadline.
    pub async fn run<T, E, Fut>(&self, attempt: Fut, cancel: &CancellationToken) -> GuardResult<T, E>
    where
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut handle = tokio::spawn(attempt);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => GuardResult::Cancelled,
            joined = tokio::time::timeout(self.deadline, &mut handle) => match joined {
                Ok(Ok(result)) => GuardResult::Completed(result),
                Ok(Err(join_error)) => GuardResult::Aborted(join_error.to_string()),
                Err(_) => {
                    tracing::debug!(deadline = ?self.deadline, "Attempt abandoned at deadline");
                    GuardResult::TimedOut(self.deadline)
                }
            },
        }
    }

    /// Run a single unretried attempt and map the verdict onto [`GatewayError`].
    ///
    /// A retryable failure exhausts a budget of one attempt.
    pub async fn call<T, E, Fut>(&self, attempt: Fut, cancel: &CancellationToken) -> Result<T, GatewayError<E>>
    where
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        match self.run(attempt, cancel).await {
            GuardResult::Completed(Ok(value)) => Ok(value),
            GuardResult::Completed(Err(AttemptError::Fatal(e))) => Err(GatewayError::Fatal(e)),
            GuardResult::Completed(Err(AttemptError::Retryable(e))) => {
                Err(GatewayError::RetriesExhausted {
                    attempts: 1,
                    last: LastFailure::Failed(e),
                })
            }
            GuardResult::TimedOut(deadline) => Err(GatewayError::Timeout(deadline)),
            GuardResult::Cancelled => Err(GatewayError::Cancelled),
            GuardResult::Aborted(reason) => Err(GatewayError::RetriesExhausted {
                attempts: 1,
                last: LastFailure::Aborted(reason),
            }),
        }
    }
}
