//! Adaptive poll interval.
//!
//! Unlike a retry backoff, the interval here is stateful: idle attempts stretch it by
//! `factor` up to `max`, and any attempt that observes activity snaps it back to `min`.
//!
//! ```text
//! min=250ms factor=1.2 max=15s
//! idle   → 250 → 300 → 360 → 432 → 518 → … → 15000 → 15000
//! active →                                   250
//! ```
use std::time::Duration;

use dura_model::PollPolicy;

#[derive(Clone, Debug)]
pub struct Backoff {
    min_ms: u64,
    max_ms: u64,
    factor: f64,
    current_ms: u64,
}

impl Backoff {
    /// Interval state as derived after a fresh start or a resume: always at the minimum.
    pub fn new(policy: &PollPolicy) -> Self {
        let min_ms = policy.min_ms.max(1);
        Self {
            min_ms,
            max_ms: policy.max_ms.max(min_ms),
            factor: if policy.factor.is_finite() && policy.factor >= 1.0 {
                policy.factor
            } else {
                1.0
            },
            current_ms: min_ms,
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    /// Snap back to the minimum interval.
    pub fn reset(&mut self) {
        self.current_ms = self.min_ms;
    }

    /// Stretch the interval by `factor`, capped at `max`.
    pub fn grow(&mut self) {
        let next = (self.current_ms as f64 * self.factor) as u64;
        self.current_ms = next.clamp(self.current_ms, self.max_ms);
    }

    /// Delay before the next attempt, given what the previous attempt observed.
    ///
    /// - idle: wait the current interval, then stretch it for next time;
    /// - active: reset and wait the minimum.
    pub fn after(&mut self, active: bool) -> Duration {
        if active {
            self.reset();
            return self.current();
        }
        let delay = self.current();
        self.grow();
        delay
    }
}
