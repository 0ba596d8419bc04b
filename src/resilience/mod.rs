//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call for a dependency:
//!     → rate_limit.rs (token bucket admission, reject fast)
//!     → circuit_breaker.rs (reject fast while open, hand out a permit)
//!     → retries.rs (sequential attempts with backoff.rs delays)
//!         → timeouts.rs (per-attempt deadline, abandon on expiry)
//!         → outcome recorded into the breaker's window.rs
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Only caller-classified retryable failures and timeouts are retried
//! - Circuit breaker prevents cascading failures
//! - All state is per dependency key; nothing is process-wide

pub mod backoff;
pub mod circuit_breaker;
pub mod outcome;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakers, CircuitState};
pub use outcome::{AttemptOutcome, AttemptRecord};
pub use rate_limit::{LimiterLevel, RateLimiter};
pub use retries::RetryExecutor;
pub use timeouts::{GuardResult, TimeoutGuard};
