//! Per-policy token bucket admission.
//!
//! # Design Decisions
//! - Non-blocking: a denied permit is an immediate rejection, never a wait
//! - Lazy refill on each check; no background ticker
//! - One lock per bucket; the map only hands out `Arc`s, so unrelated
//!   policies never contend on the same bucket lock
//! - Limits are read from the caller's policy snapshot on every check,
//!   so a hot-swapped policy takes effect on the next call

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

use crate::policy::RateLimitPolicy;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Clamping also applies a lowered capacity after a policy swap.
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        self.refill(capacity, refill_rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Current fill level of one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterLevel {
    pub policy: String,
    pub available: f64,
    pub capacity: u32,
}

/// Token buckets keyed by policy name.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, name: &str, capacity: f64) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(name) {
            return Arc::clone(&bucket);
        }
        let entry = self
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(capacity))));
        Arc::clone(&entry)
    }

    /// Take one permit for `name` if available. Never blocks waiting for tokens.
    pub fn try_acquire(&self, name: &str, limits: &RateLimitPolicy) -> bool {
        let capacity = f64::from(limits.capacity);
        let bucket = self.bucket(name, capacity);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(capacity, limits.refill_per_second)
    }

    /// Tokens currently available for `name` (a missing bucket is full).
    pub fn available(&self, name: &str, limits: &RateLimitPolicy) -> f64 {
        let capacity = f64::from(limits.capacity);
        let Some(bucket) = self.buckets.get(name).map(|b| Arc::clone(&b)) else {
            return capacity;
        };
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(capacity, limits.refill_per_second);
        bucket.tokens
    }

    /// Drop the bucket for a policy that no longer exists.
    pub fn remove(&self, name: &str) {
        self.buckets.remove(name);
    }
}
