//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are recorded
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: window volume >= min_volume AND failure rate >= threshold
//! Open → Half-Open: first call after open_duration (evaluated lazily)
//! Half-Open → Closed: half_open_trials trials all succeed
//! Half-Open → Open: any trial fails (open timer restarts)
//! ```
//!
//! # Design Decisions
//! - Per-dependency breaker (not global), each behind its own mutex
//! - Admission hands out a `BreakerPermit`; the outcome is recorded through it
//! - Every transition bumps a generation; outcomes from permits issued in an
//!   older generation never drive a transition
//! - A permit dropped without an outcome frees its half-open trial slot

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::policy::BreakerPolicy;
use crate::resilience::outcome::AttemptOutcome;
use crate::resilience::window::{RollingWindow, WindowCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission refused: the circuit is open (or half-open with no trial slot left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerRejected {
    pub state: CircuitState,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: RollingWindow,
    last_transition: Instant,
    generation: u64,
    trials_in_flight: u32,
    trials_succeeded: u32,
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub policy: String,
    pub state: CircuitState,
    pub successes: u32,
    pub failures: u32,
    pub timeouts: u32,
    pub fatals: u32,
    pub volume: u32,
    pub failure_rate: f64,
    pub window_size: usize,
    pub millis_since_transition: u64,
    pub trials_in_flight: u32,
}

/// Circuit breaker for a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        let name = name.into();
        tracing::debug!(policy = %name, window_size, "Creating circuit breaker");
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: RollingWindow::new(window_size),
                last_transition: Instant::now(),
                generation: 0,
                trials_in_flight: 0,
                trials_succeeded: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state as last recorded (Open → HalfOpen is only applied on admission).
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn counts(&self) -> WindowCounts {
        self.lock().window.counts()
    }

    /// Ask to let one call through.
    pub fn try_acquire(
        self: &Arc<Self>,
        settings: &BreakerPolicy,
    ) -> Result<BreakerPermit, BreakerRejected> {
        let mut inner = self.lock();
        inner.window.resize(settings.window_size as usize);

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if inner.last_transition.elapsed() < settings.open_duration() {
                    return Err(BreakerRejected {
                        state: CircuitState::Open,
                    });
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trials_in_flight += 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight + inner.trials_succeeded >= settings.half_open_trials {
                    return Err(BreakerRejected {
                        state: CircuitState::HalfOpen,
                    });
                }
                inner.trials_in_flight += 1;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self.clone(),
            settings: settings.clone(),
            generation: inner.generation,
            trial,
            completed: false,
        })
    }

    fn record(&self, permit: &BreakerPermit, outcome: AttemptOutcome) {
        if outcome == AttemptOutcome::Rejected {
            return;
        }

        let mut inner = self.lock();
        if inner.generation != permit.generation {
            tracing::trace!(policy = %self.name, %outcome, "Ignoring outcome from previous breaker generation");
            return;
        }

        let settings = &permit.settings;
        match inner.state {
            CircuitState::Closed => {
                inner.window.push(outcome);
                let counts = inner.window.counts();
                if counts.total() >= settings.min_volume
                    && counts.failure_rate() >= settings.failure_rate_threshold
                {
                    tracing::warn!(
                        policy = %self.name,
                        volume = counts.total(),
                        failure_rate = counts.failure_rate(),
                        threshold = settings.failure_rate_threshold,
                        "Failure rate threshold reached, opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if permit.trial => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                if outcome.is_failure() {
                    tracing::warn!(policy = %self.name, %outcome, "Trial call failed, reopening circuit");
                    self.transition(&mut inner, CircuitState::Open);
                } else {
                    inner.trials_succeeded += 1;
                    if inner.trials_succeeded >= settings.half_open_trials {
                        inner.window.clear();
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
            }
            // Same generation guarantees no other combination is reachable.
            _ => {}
        }
    }

    fn release(&self, permit: &BreakerPermit) {
        if !permit.trial {
            return;
        }
        let mut inner = self.lock();
        if inner.generation == permit.generation && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition = Instant::now();
        inner.generation += 1;
        inner.trials_in_flight = 0;
        inner.trials_succeeded = 0;

        tracing::info!(policy = %self.name, %from, %to, "Circuit state transition");
        metrics::record_breaker_transition(&self.name, from, to);
    }

    /// Force the breaker back to Closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.window.clear();
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let counts = inner.window.counts();
        BreakerSnapshot {
            policy: self.name.clone(),
            state: inner.state,
            successes: counts.successes,
            failures: counts.failures,
            timeouts: counts.timeouts,
            fatals: counts.fatals,
            volume: counts.total(),
            failure_rate: counts.failure_rate(),
            window_size: inner.window.capacity(),
            millis_since_transition: inner.last_transition.elapsed().as_millis() as u64,
            trials_in_flight: inner.trials_in_flight,
        }
    }
}

/// Admission token for one attempt.
///
/// Consume it with [`BreakerPermit::record`]; dropping it unrecorded
/// (e.g. on cancellation) only frees a half-open trial slot.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    settings: BreakerPolicy,
    generation: u64,
    trial: bool,
    completed: bool,
}

impl BreakerPermit {
    /// True when this permit was issued as a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: AttemptOutcome) {
        self.completed = true;
        self.breaker.record(&self, outcome);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.release(self);
        }
    }
}

/// Breakers keyed by policy name, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, settings: &BreakerPolicy) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(&breaker);
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(name, settings.window_size as usize))
        });
        Arc::clone(&entry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(&b))
    }

    pub fn remove(&self, name: &str) {
        self.breakers.remove(name);
    }

    /// Snapshots of all breakers, sorted by policy name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.policy.cmp(&b.policy));
        snapshots
    }
}
