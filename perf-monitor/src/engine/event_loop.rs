//! The dispatch loop
//!
//! Each iteration waits on the ring buffers for at most the time left in
//! the current interval, drains the rings when there is something to read
//! (or when stopping, or at an interval boundary), then runs the counter
//! aggregator, the interval hook and a pending SIGUSR1 hook. The loop ends
//! when a stop is requested or a callback asks for reinitialization.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use super::counters;
use super::deadline::Deadline;
use super::dispatch::dispatch;
use super::lifecycle::Session;
use super::Env;
use crate::events::EventList;
use crate::monitor::{Ctx, Monitor};

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    Stopped,
    Reinit,
}

impl Session<'_> {
    pub(crate) fn run(&mut self, env: &mut Env<'_>) -> LoopExit {
        let hooks = self.monitor.hooks();
        let mapped = self.events.is_mapped();
        let mut deadline = env.config.interval.map(|i| Deadline::start(i, Instant::now()));
        let mut time_left = env.config.interval;

        while !env.stop.load(Ordering::Relaxed) && !self.reinit {
            let ready = match self.events.poll(time_left) {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("poll failed: {e}");
                    0
                }
            };
            let stopping = env.stop.load(Ordering::Relaxed);
            let elapsed = time_left == Some(Duration::ZERO);

            if mapped && (ready > 0 || stopping || elapsed) {
                let n = self.drain(env);
                trace!("drained {n} record(s)");
            }

            if hooks.read && elapsed {
                counters::deliver(self.monitor, &mut self.events, env, &mut self.reinit);
            }

            if hooks.interval && elapsed {
                let mut ctx =
                    Ctx::new(self.events.targets(), env.config, env.host, &mut *env.out, &mut self.reinit);
                self.monitor.interval(&mut ctx);
            }

            if hooks.sigusr1 && env.usr1.swap(false, Ordering::Relaxed) {
                let mut ctx =
                    Ctx::new(self.events.targets(), env.config, env.host, &mut *env.out, &mut self.reinit);
                self.monitor.sigusr1(&mut ctx);
            }

            if let Some(deadline) = deadline.as_mut() {
                time_left = Some(deadline.time_left(Instant::now()));
            }
        }

        if env.stop.load(Ordering::Relaxed) {
            debug!("monitor({}) stopping", self.monitor.name());
            LoopExit::Stopped
        } else {
            LoopExit::Reinit
        }
    }

    /// Read every ring once, in instance order. Returns the number of
    /// records seen, including ones that failed to decode.
    fn drain(&mut self, env: &mut Env<'_>) -> usize {
        drain_rings(self.monitor, &mut self.events, env, &mut self.reinit)
    }
}

fn drain_rings(
    monitor: &mut dyn Monitor,
    events: &mut EventList,
    env: &mut Env<'_>,
    reinit: &mut bool,
) -> usize {
    let (rings, targets) = events.rings_and_targets();
    let mut ctx = Ctx::new(targets, env.config, env.host, &mut *env.out, reinit);
    let mut seen = 0;

    for ring in rings {
        if !ring.buffer.read_init() {
            continue;
        }
        while let Some(raw) = ring.buffer.read_event() {
            seen += 1;
            if let Err(e) = dispatch(monitor, &mut ctx, raw, ring.instance) {
                warn!("{e} on {}", targets.describe(ring.instance));
            }
            ring.buffer.consume();
        }
        ring.buffer.read_done();
    }
    seen
}
