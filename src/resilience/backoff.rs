//! Backoff schedule with optional jitter.

use rand::Rng;
use std::time::Duration;

use crate::policy::{BackoffKind, BackoffPolicy};

/// Delay to wait after the given (1-based) failed attempt.
///
/// Jitter only ever adds to the scheduled delay.
pub fn calculate_backoff(attempt: u32, backoff: &BackoffPolicy) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = match backoff.kind {
        BackoffKind::Fixed => backoff.base_ms,
        BackoffKind::Exponential => {
            let exponential_base = 2u64.saturating_pow(attempt - 1);
            backoff.base_ms.saturating_mul(exponential_base).min(backoff.cap_ms)
        }
    };

    let jitter_range = (delay_ms as f64 * backoff.jitter) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential(base_ms: u64, cap_ms: u64, jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            kind: BackoffKind::Exponential,
            base_ms,
            cap_ms,
            jitter,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = exponential(100, 2000, 0.0);
        assert_eq!(calculate_backoff(1, &policy), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &policy), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, &policy), Duration::from_millis(400));

        let capped = exponential(100, 1000, 0.0);
        assert_eq!(calculate_backoff(10, &capped), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(64, &capped), Duration::from_millis(1000));
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = BackoffPolicy {
            kind: BackoffKind::Fixed,
            base_ms: 50,
            cap_ms: 50,
            jitter: 0.0,
        };
        assert_eq!(calculate_backoff(1, &policy), Duration::from_millis(50));
        assert_eq!(calculate_backoff(7, &policy), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_only_adds() {
        let policy = exponential(100, 2000, 0.5);
        for _ in 0..50 {
            let delay = calculate_backoff(2, &policy);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(300));
        }
    }

    #[test]
    fn test_zero_attempt() {
        assert_eq!(calculate_backoff(0, &exponential(100, 2000, 0.0)), Duration::ZERO);
    }
}
