//! Drift-compensated interval deadline
//!
//! The dispatch loop polls with whatever time is left until the next
//! interval boundary. Once the boundary passes, the next one is set one
//! interval ahead minus however late this one was noticed, so a late tick
//! shortens the following interval instead of shifting every later one.

use std::time::{Duration, Instant};

use log::debug;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    interval: Duration,
    end: Instant,
}

impl Deadline {
    /// First boundary one interval after `now`.
    pub(crate) fn start(interval: Duration, now: Instant) -> Self {
        Self { interval, end: now + interval }
    }

    /// Time until the boundary. Zero means the boundary has passed; the
    /// deadline is then re-armed relative to `now`.
    pub(crate) fn time_left(&mut self, now: Instant) -> Duration {
        if now < self.end {
            return self.end - now;
        }
        let lateness = now - self.end;
        if lateness > self.interval {
            debug!("interval overran by {lateness:?}");
        }
        self.end = (now + self.interval).checked_sub(lateness).unwrap_or(now);
        Duration::ZERO
    }
}
