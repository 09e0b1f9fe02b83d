//! Single one-second tick scheduler owned by the session controller
//!
//! Countdown, rest, elapsed-time and calorie timers all live here so they
//! can be suspended, re-anchored and cancelled together. The scheduler does
//! no waiting of its own: the caller polls [`TickScheduler::due`] with the
//! current time (from the async runner, or directly in tests).

use std::time::{Duration, Instant};

/// Periodic callbacks the controller needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Countdown,
    Rest,
    Elapsed,
    Calorie,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    kind: TickKind,
    next_due: Instant,
}

#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    timers: Vec<Timer>,
    suspended: bool,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            timers: Vec::with_capacity(4),
            suspended: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start (or restart) `kind`, first firing one period after `now`
    pub fn schedule(&mut self, kind: TickKind, now: Instant) {
        self.cancel(kind);
        self.timers.push(Timer {
            kind,
            next_due: now + self.period,
        });
    }

    pub fn cancel(&mut self, kind: TickKind) {
        self.timers.retain(|timer| timer.kind != kind);
    }

    /// Drop every timer at once
    pub fn cancel_all(&mut self) {
        self.timers.clear();
        self.suspended = false;
    }

    pub fn is_scheduled(&self, kind: TickKind) -> bool {
        self.timers.iter().any(|timer| timer.kind == kind)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume every timer with its reference point moved to `now`.
    /// Ticks missed while suspended are not replayed.
    pub fn resume(&mut self, now: Instant) {
        self.suspended = false;
        for timer in &mut self.timers {
            timer.next_due = now + self.period;
        }
    }

    /// Timers due at `now`, in scheduling order. Each timer fires at most
    /// once per call; a timer that fell more than a period behind skips the
    /// missed ticks.
    pub fn due(&mut self, now: Instant) -> Vec<TickKind> {
        if self.suspended {
            return Vec::new();
        }

        let period = self.period;
        let mut fired = Vec::new();
        for timer in &mut self.timers {
            if timer.next_due <= now {
                fired.push(timer.kind);
                timer.next_due += period;
                if timer.next_due <= now {
                    timer.next_due = now + period;
                }
            }
        }
        fired
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
