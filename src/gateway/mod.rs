//! Gateway facade: the single entry point for guarded calls.
//!
//! # Data Flow
//! ```text
//! invoke(policy, operation)
//!     → PolicyRegistry::resolve (UnknownPolicy)
//!     → RateLimiter::try_acquire (RateLimited, not recorded by the breaker)
//!     → CircuitBreaker::try_acquire (CircuitOpen)
//!     → RetryExecutor → TimeoutGuard → operation
//! ```
//!
//! # Design Decisions
//! - Explicit composition, no annotations or injected proxies
//! - The resolved `Arc<Policy>` is pinned for the whole invocation
//! - Dependencies of the wrapped operation are captured by the closure
//! - The gateway owns its registry; every policy mutation goes through it so
//!   limiter and breaker state never outlives the policy it belongs to

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AttemptError, GatewayError, RegistryError};
use crate::observability::metrics;
use crate::policy::registry::ReloadSummary;
use crate::policy::{Policy, PolicyRegistry};
use crate::resilience::{
    BreakerSnapshot, CircuitBreakers, LimiterLevel, RateLimiter, RetryExecutor,
};

/// Resilience gateway shared by every caller of a process.
#[derive(Debug)]
pub struct Gateway {
    registry: PolicyRegistry,
    limiter: RateLimiter,
    breakers: CircuitBreakers,
}

impl Gateway {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            registry,
            limiter: RateLimiter::new(),
            breakers: CircuitBreakers::new(),
        }
    }

    pub fn from_policies(policies: Vec<Policy>) -> Result<Self, RegistryError> {
        Ok(Self::new(PolicyRegistry::from_policies(policies)?))
    }

    /// Resolve a registered policy without invoking anything.
    pub fn resolve(&self, policy: &str) -> Result<Arc<Policy>, RegistryError> {
        self.registry.resolve(policy)
    }

    /// Registered policies sorted by name.
    pub fn policies(&self) -> Vec<Arc<Policy>> {
        self.registry.snapshot()
    }

    pub fn policy_count(&self) -> usize {
        self.registry.len()
    }

    /// Invoke `operation` under the named policy.
    pub async fn invoke<T, E, F, Fut>(&self, policy: &str, operation: F) -> Result<T, GatewayError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.invoke_with_cancel(policy, &CancellationToken::new(), operation)
            .await
    }

    /// Invoke `operation`, aborting at the next suspension point once `cancel` fires.
    pub async fn invoke_with_cancel<T, E, F, Fut>(
        &self,
        policy: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!("invoke", policy = %policy, %invocation_id);
        let start = Instant::now();

        let result = self
            .dispatch(policy, cancel, operation)
            .instrument(span.clone())
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        span.in_scope(|| {
            tracing::debug!(outcome, elapsed_ms = start.elapsed().as_millis() as u64, "Invocation finished");
        });
        metrics::record_invocation(policy, outcome, start);
        result
    }

    async fn dispatch<T, E, F, Fut>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let policy = self
            .registry
            .resolve(name)
            .map_err(|_| GatewayError::UnknownPolicy(name.to_string()))?;

        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        if !self.limiter.try_acquire(&policy.name, &policy.rate_limit) {
            tracing::warn!("Rate limit exceeded");
            metrics::record_rejection(&policy.name, "rate_limited");
            return Err(GatewayError::RateLimited {
                policy: policy.name.clone(),
            });
        }

        let breaker = self.breakers.get_or_create(&policy.name, &policy.breaker);
        let permit = match breaker.try_acquire(&policy.breaker) {
            Ok(permit) => permit,
            Err(rejected) => {
                tracing::warn!(state = %rejected.state, "Circuit open, rejecting call");
                metrics::record_rejection(&policy.name, "circuit_open");
                return Err(GatewayError::CircuitOpen {
                    policy: policy.name.clone(),
                });
            }
        };

        RetryExecutor::new(policy, breaker, cancel.clone())
            .execute(permit, operation)
            .await
    }

    /// Swap in a new policy table, dropping limiter and breaker state of
    /// removed policies.
    pub fn apply_policies(&self, policies: Vec<Policy>) -> Result<ReloadSummary, RegistryError> {
        let summary = self.registry.apply(policies)?;
        for name in &summary.removed {
            self.limiter.remove(name);
            self.breakers.remove(name);
        }
        Ok(summary)
    }

    /// Register a single policy.
    ///
    /// A replaced policy keeps its limiter and breaker state, like an updated
    /// policy in [`Gateway::apply_policies`]. A new name always starts fresh.
    pub fn register_policy(&self, policy: Policy, replace: bool) -> Result<Arc<Policy>, RegistryError> {
        let name = policy.name.clone();
        let replacing = self.registry.resolve(&name).is_ok();
        let registered = self.registry.register(policy, replace)?;
        if !replacing {
            self.limiter.remove(&name);
            self.breakers.remove(&name);
        }
        Ok(registered)
    }

    /// Remove a policy together with its limiter and breaker state.
    pub fn remove_policy(&self, policy: &str) -> Result<Arc<Policy>, RegistryError> {
        let removed = self.registry.remove(policy)?;
        self.limiter.remove(policy);
        self.breakers.remove(policy);
        Ok(removed)
    }

    /// Force a policy's breaker back to Closed.
    pub fn reset_breaker(&self, policy: &str) -> Result<(), RegistryError> {
        let policy = self.registry.resolve(policy)?;
        if let Some(breaker) = self.breakers.get(&policy.name) {
            breaker.reset();
        }
        Ok(())
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    /// Token levels for every registered policy.
    pub fn limiter_levels(&self) -> Vec<LimiterLevel> {
        self.registry
            .snapshot()
            .iter()
            .map(|policy| LimiterLevel {
                policy: policy.name.clone(),
                available: self.limiter.available(&policy.name, &policy.rate_limit),
                capacity: policy.rate_limit.capacity,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::policy;
    use crate::resilience::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_unknown_policy() {
        let gateway = Gateway::from_policies(vec![]).unwrap();
        let result = gateway
            .invoke("missing", || async { Ok::<_, AttemptError<String>>(()) })
            .await;
        assert_eq!(result, Err(GatewayError::UnknownPolicy("missing".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_calls_not_recorded() {
        let mut p = policy("inventory");
        p.rate_limit.capacity = 1;
        p.rate_limit.refill_per_second = 0.001;
        let gateway = Gateway::from_policies(vec![p]).unwrap();

        let ok = gateway
            .invoke("inventory", || async { Ok::<_, AttemptError<String>>(1) })
            .await;
        assert_eq!(ok, Ok(1));

        let limited = gateway
            .invoke("inventory", || async { Ok::<_, AttemptError<String>>(2) })
            .await;
        assert_eq!(
            limited,
            Err(GatewayError::RateLimited {
                policy: "inventory".into()
            })
        );

        let snapshot = &gateway.breaker_snapshots()[0];
        assert_eq!(snapshot.volume, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_operation() {
        let mut p = policy("inventory");
        p.max_attempts = 1;
        let gateway = Gateway::from_policies(vec![p]).unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let counter = calls.clone();
            let _ = gateway
                .invoke("inventory", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(AttemptError::retryable("down")) }
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        let counter = calls.clone();
        let result = gateway
            .invoke("inventory", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AttemptError<&str>>(()) }
            })
            .await;
        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        gateway.reset_breaker("inventory").unwrap();
        assert_eq!(gateway.breaker_snapshots()[0].state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_drops_state_of_removed_policies() {
        let gateway = Gateway::from_policies(vec![policy("a"), policy("b")]).unwrap();
        for name in ["a", "b"] {
            gateway
                .invoke(name, || async { Ok::<_, AttemptError<String>>(()) })
                .await
                .unwrap();
        }
        assert_eq!(gateway.breaker_snapshots().len(), 2);

        let summary = gateway.apply_policies(vec![policy("a")]).unwrap();
        assert_eq!(summary.removed, vec!["b".to_string()]);
        assert_eq!(gateway.breaker_snapshots().len(), 1);
        assert_eq!(gateway.limiter_levels().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistered_policy_starts_with_fresh_state() {
        let mut p = policy("payments");
        p.max_attempts = 1;
        p.rate_limit.capacity = 10;
        p.rate_limit.refill_per_second = 0.001;
        let gateway = Gateway::from_policies(vec![p.clone()]).unwrap();

        for _ in 0..5 {
            let _ = gateway
                .invoke("payments", || async { Err::<(), _>(AttemptError::retryable("down")) })
                .await;
        }
        assert_eq!(gateway.breaker_snapshots()[0].state, CircuitState::Open);

        gateway.remove_policy("payments").unwrap();
        assert!(gateway.breaker_snapshots().is_empty());

        gateway.register_policy(p, false).unwrap();
        assert_eq!(gateway.limiter_levels()[0].available, 10.0);

        let result = gateway
            .invoke("payments", || async { Ok::<_, AttemptError<&str>>(()) })
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(gateway.breaker_snapshots()[0].state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_policy_keeps_breaker_state() {
        let mut p = policy("payments");
        p.max_attempts = 1;
        let gateway = Gateway::from_policies(vec![p.clone()]).unwrap();

        for _ in 0..5 {
            let _ = gateway
                .invoke("payments", || async { Err::<(), _>(AttemptError::retryable("down")) })
                .await;
        }

        p.per_attempt_timeout_ms = 250;
        gateway.register_policy(p.clone(), true).unwrap();
        assert_eq!(gateway.breaker_snapshots()[0].state, CircuitState::Open);
        assert_eq!(
            gateway.register_policy(p, false),
            Err(RegistryError::DuplicatePolicy("payments".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_consumes_no_permit() {
        let mut p = policy("search");
        p.rate_limit.capacity = 1;
        p.rate_limit.refill_per_second = 0.001;
        let gateway = Gateway::from_policies(vec![p]).unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = calls.clone();
        let cancelled = gateway
            .invoke_with_cancel("search", &cancel, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AttemptError<String>>(()) }
            })
            .await;
        assert_eq!(cancelled, Err(GatewayError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(gateway.breaker_snapshots().is_empty());

        let result = gateway
            .invoke("search", || async { Ok::<_, AttemptError<String>>(()) })
            .await;
        assert_eq!(result, Ok(()));
    }
}
