//! Time gates driven by the caller's clock.
//!
//! Nothing here reads the clock itself: every method takes `now`, so the tick
//! loop decides what time it is and tests can step time explicitly.

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};
#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

/// Lets an action through at most once per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the gate would open at `now`, without consuming it.
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Open the gate if the interval has elapsed, recording `now` as the last firing.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.is_ready(now) {
            self.last_fired = Some(now);
            true
        } else {
            false
        }
    }

    /// Record a firing that bypassed the gate (forced sends).
    pub fn mark_fired(&mut self, now: Instant) {
        self.last_fired = Some(now);
    }
}

/// Recurring timer with an explicit start and cancel.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    /// Create a stopped timer.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns `true` once per elapsed period. Missed periods are not replayed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.period);
                true
            }
            _ => false,
        }
    }
}
