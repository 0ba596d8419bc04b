//! Fixed-size rolling window of attempt outcomes.
//!
//! Ring buffer: once full, each new outcome overwrites the oldest one.
//! Counts are maintained incrementally so every update is O(1).

use crate::resilience::outcome::AttemptOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub successes: u32,
    pub failures: u32,
    pub timeouts: u32,
    pub fatals: u32,
}

impl WindowCounts {
    pub fn total(&self) -> u32 {
        self.successes + self.failures + self.timeouts + self.fatals
    }

    /// Failures and timeouts over everything in the window.
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.failures + self.timeouts) / f64::from(total)
    }

    fn slot(&mut self, outcome: AttemptOutcome) -> Option<&mut u32> {
        match outcome {
            AttemptOutcome::Success => Some(&mut self.successes),
            AttemptOutcome::Failure => Some(&mut self.failures),
            AttemptOutcome::Timeout => Some(&mut self.timeouts),
            AttemptOutcome::Fatal => Some(&mut self.fatals),
            AttemptOutcome::Rejected => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    slots: Vec<AttemptOutcome>,
    capacity: usize,
    /// Index of the oldest entry once the buffer is full.
    head: usize,
    counts: WindowCounts,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            counts: WindowCounts::default(),
        }
    }

    /// Record an outcome. `Rejected` never enters the window.
    pub fn push(&mut self, outcome: AttemptOutcome) {
        let Some(count) = self.counts.slot(outcome) else {
            return;
        };
        *count += 1;

        if self.slots.len() < self.capacity {
            self.slots.push(outcome);
            return;
        }

        let evicted = std::mem::replace(&mut self.slots[self.head], outcome);
        self.head = (self.head + 1) % self.capacity;
        if let Some(count) = self.counts.slot(evicted) {
            *count -= 1;
        }
    }

    pub fn counts(&self) -> WindowCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.counts = WindowCounts::default();
    }

    /// Change the window size, keeping the most recent outcomes.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }

        let ordered = self.ordered();
        let keep = ordered.len().saturating_sub(capacity);
        let mut resized = RollingWindow::new(capacity);
        for outcome in &ordered[keep..] {
            resized.push(*outcome);
        }
        *self = resized;
    }

    /// Outcomes from oldest to newest.
    fn ordered(&self) -> Vec<AttemptOutcome> {
        if self.slots.len() < self.capacity {
            return self.slots.clone();
        }
        let mut ordered = Vec::with_capacity(self.capacity);
        ordered.extend_from_slice(&self.slots[self.head..]);
        ordered.extend_from_slice(&self.slots[..self.head]);
        ordered
    }
}
