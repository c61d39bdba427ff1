//! Counter aggregator
//!
//! Reads every opened counter once per interval and hands each value to the
//! monitor. Iteration is CPU outermost, then thread, then event, so a
//! CPU-scoped monitor sees all events of one CPU before the next CPU.

use log::debug;

use super::Env;
use crate::domain::EventId;
use crate::events::EventList;
use crate::monitor::{Ctx, Monitor};

/// Read and deliver all counters. Returns how many values were delivered;
/// counters that cannot be read right now are skipped.
pub(crate) fn deliver(
    monitor: &mut dyn Monitor,
    events: &mut EventList,
    env: &mut Env<'_>,
    reinit: &mut bool,
) -> usize {
    let nr_cpus = events.targets().cpu_map().len();
    let nr_threads = events.targets().thread_map().len();
    let cpu_scoped = events.targets().is_cpu_scoped();
    let mut delivered = 0;

    for cpu_idx in 0..nr_cpus {
        for thread_idx in 0..nr_threads {
            for idx in 0..events.len() {
                let id = EventId(idx);
                let count = match events.read(id, cpu_idx, thread_idx) {
                    Ok(count) => count,
                    Err(e) => {
                        debug!("skipping counter {idx} at cpu {cpu_idx} thread {thread_idx}: {e}");
                        continue;
                    }
                };
                let Some(evsel) = events.get(id) else { continue };
                let ins = if cpu_scoped { cpu_idx } else { thread_idx };
                let mut ctx =
                    Ctx::new(events.targets(), env.config, env.host, &mut *env.out, &mut *reinit);
                monitor.read(&mut ctx, evsel, &count, ins);
                delivered += 1;
            }
        }
    }
    delivered
}
