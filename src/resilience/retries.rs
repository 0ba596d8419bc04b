//! Retry logic.
//!
//! # Responsibilities
//! - Run attempts strictly one after another, up to `max_attempts`
//! - Ask the circuit breaker for admission before every attempt
//! - Sleep the backoff between attempts, honoring cancellation
//! - Surface only the final outcome; intermediate ones are logged and recorded
//!
//! # Design Decisions
//! - Never retry `Fatal` errors or breaker rejections
//! - Timeouts and aborted attempts are retryable failures
//! - Every attempted outcome feeds the breaker window

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AttemptError, GatewayError, LastFailure};
use crate::observability::metrics;
use crate::policy::Policy;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::{BreakerPermit, CircuitBreaker};
use crate::resilience::outcome::{AttemptOutcome, AttemptRecord};
use crate::resilience::timeouts::{GuardResult, TimeoutGuard};

/// Executes one invocation's attempts under a pinned policy.
pub struct RetryExecutor {
    policy: Arc<Policy>,
    breaker: Arc<CircuitBreaker>,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(policy: Arc<Policy>, breaker: Arc<CircuitBreaker>, cancel: CancellationToken) -> Self {
        Self {
            policy,
            breaker,
            cancel,
        }
    }

    /// Run `operation` with retries. `first_permit` is the breaker admission
    /// already granted for attempt 1.
    pub async fn execute<T, E, F, Fut>(
        &self,
        first_permit: BreakerPermit,
        mut operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let policy = &self.policy;
        let guard = TimeoutGuard::new(policy.per_attempt_timeout());
        let max_attempts = policy.max_attempts.max(1);
        let mut permit = Some(first_permit);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let admitted = match permit.take() {
                Some(permit) => permit,
                None => match self.breaker.try_acquire(&policy.breaker) {
                    Ok(permit) => permit,
                    Err(rejected) => {
                        tracing::warn!(
                            attempt,
                            state = %rejected.state,
                            "Circuit rejected retry attempt"
                        );
                        metrics::record_rejection(&policy.name, "circuit_open");
                        self.observe(AttemptRecord {
                            attempt,
                            outcome: AttemptOutcome::Rejected,
                            latency: std::time::Duration::ZERO,
                        });
                        return Err(GatewayError::CircuitOpen {
                            policy: policy.name.clone(),
                        });
                    }
                },
            };

            if self.cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let started = Instant::now();
            let verdict = guard.run(operation(), &self.cancel).await;
            let latency = started.elapsed();

            let (outcome, last) = match verdict {
                GuardResult::Completed(Ok(value)) => {
                    admitted.record(AttemptOutcome::Success);
                    self.observe(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Success,
                        latency,
                    });
                    return Ok(value);
                }
                GuardResult::Completed(Err(AttemptError::Fatal(e))) => {
                    admitted.record(AttemptOutcome::Fatal);
                    self.observe(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Fatal,
                        latency,
                    });
                    return Err(GatewayError::Fatal(e));
                }
                GuardResult::Cancelled => {
                    drop(admitted);
                    tracing::debug!(attempt, "Attempt cancelled by caller");
                    return Err(GatewayError::Cancelled);
                }
                GuardResult::Completed(Err(AttemptError::Retryable(e))) => {
                    (AttemptOutcome::Failure, LastFailure::Failed(e))
                }
                GuardResult::TimedOut(deadline) => {
                    (AttemptOutcome::Timeout, LastFailure::Timeout(deadline))
                }
                GuardResult::Aborted(reason) => {
                    tracing::error!(attempt, reason = %reason, "Attempt task aborted");
                    (AttemptOutcome::Failure, LastFailure::Aborted(reason))
                }
            };

            admitted.record(outcome);
            self.observe(AttemptRecord {
                attempt,
                outcome,
                latency,
            });

            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, %outcome, "Retry budget exhausted");
                return Err(GatewayError::RetriesExhausted {
                    attempts: attempt,
                    last,
                });
            }

            let backoff = calculate_backoff(attempt, &policy.backoff);
            tracing::info!(attempt, delay = ?backoff, %outcome, "Retrying");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    fn observe(&self, record: AttemptRecord) {
        tracing::debug!(
            attempt = record.attempt,
            outcome = %record.outcome,
            latency_ms = record.latency.as_millis() as u64,
            "Attempt finished"
        );
        metrics::record_attempt(&self.policy.name, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::policy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn executor(policy: Policy) -> (RetryExecutor, Arc<CircuitBreaker>, BreakerPermit) {
        let breaker = Arc::new(CircuitBreaker::new(policy.name.clone(), 10));
        let permit = breaker.try_acquire(&policy.breaker).unwrap();
        let executor = RetryExecutor::new(Arc::new(policy), breaker.clone(), CancellationToken::new());
        (executor, breaker, permit)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let (executor, breaker, permit) = executor(policy("inventory"));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let started = Instant::now();
        let result = executor
            .execute(permit, move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AttemptError::retryable("unavailable"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(breaker.counts().failures, 2);
        assert_eq!(breaker.counts().successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let (executor, _, permit) = executor(policy("inventory"));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute(permit, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(AttemptError::retryable(format!("failure {n}"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(GatewayError::RetriesExhausted {
                attempts: 3,
                last: LastFailure::Failed("failure 2".to_string()),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_not_retried() {
        let (executor, breaker, permit) = executor(policy("inventory"));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute(permit, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::fatal("invalid order id")) }
            })
            .await;

        assert_eq!(result, Err(GatewayError::Fatal("invalid order id")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.counts().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried() {
        let mut p = policy("inventory");
        p.max_attempts = 2;
        p.per_attempt_timeout_ms = 20;
        let (executor, breaker, permit) = executor(p);

        let result: Result<(), GatewayError<String>> = executor
            .execute(permit, || std::future::pending())
            .await;

        assert!(result.as_ref().unwrap_err().is_timeout());
        assert_eq!(breaker.counts().timeouts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_rejection_stops_retries() {
        let mut p = policy("inventory");
        p.max_attempts = 5;
        p.breaker.min_volume = 1;
        p.breaker.failure_rate_threshold = 1.0;
        let (executor, _, permit) = executor(p);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = executor
            .execute(permit, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::retryable("down")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result,
            Err(GatewayError::CircuitOpen {
                policy: "inventory".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let mut p = policy("inventory");
        p.backoff.base_ms = 60_000;
        p.backoff.cap_ms = 60_000;
        let breaker = Arc::new(CircuitBreaker::new("inventory", 10));
        let permit = breaker.try_acquire(&p.breaker).unwrap();
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::new(Arc::new(p), breaker, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = executor
            .execute(permit, || async { Err(AttemptError::retryable("flaky")) })
            .await;

        assert_eq!(result, Err(GatewayError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
