//! `stat`: periodic counter deltas
//!
//! Pull-mode monitor. Opens one counting event per `-e` name on every
//! instance and prints how much each advanced during the last interval,
//! summed over instances or per instance with `--perins`. When the set of
//! online CPUs changes it asks for reinitialization so the counters follow
//! the new set.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use log::{info, warn};

use crate::config::Config;
use crate::domain::{CpuId, EventId, MonitorError};
use crate::events::{hw, sw, CounterValue, EventAttr, EventList, EventType, Evsel};
use crate::monitor::{Ctx, Hooks, Monitor};

const NAME: &str = "stat";

/// Counted when `-e` is not given.
const DEFAULT_EVENTS: &[&str] = &["cpu-clock", "context-switches"];

/// Counting event for a perf-style event name, or `r<hex>` for a raw
/// PMU event code.
fn counter_attr(name: &str) -> Option<EventAttr> {
    let attr = match name {
        "cpu-clock" => EventAttr::software(name, sw::CPU_CLOCK),
        "task-clock" => EventAttr::software(name, sw::TASK_CLOCK),
        "context-switches" | "cs" => EventAttr::software(name, sw::CONTEXT_SWITCHES),
        "cycles" | "cpu-cycles" => EventAttr::hardware(name, hw::CPU_CYCLES),
        "instructions" => EventAttr::hardware(name, hw::INSTRUCTIONS),
        "cache-misses" => EventAttr::hardware(name, hw::CACHE_MISSES),
        "branch-misses" => EventAttr::hardware(name, hw::BRANCH_MISSES),
        _ => {
            let code = u64::from_str_radix(name.strip_prefix('r')?, 16).ok()?;
            EventAttr::new(name, EventType::Raw, code)
        }
    };
    Some(attr)
}

#[derive(Debug, Default)]
pub struct Stat {
    names: Vec<String>,
    /// Last cumulative reading per (event, instance).
    last: HashMap<(EventId, usize), u64>,
    /// Advance during the current interval per (event, instance).
    deltas: BTreeMap<(EventId, usize), u64>,
    /// Online CPUs seen at the first interval of this pass.
    online: Option<Vec<CpuId>>,
}

impl Stat {
    fn check_online(&mut self, ctx: &mut Ctx<'_>) {
        if !ctx.is_cpu_scoped() {
            return;
        }
        let now = match ctx.online_cpus() {
            Ok(now) => now,
            Err(e) => {
                warn!("{NAME}: {e}");
                return;
            }
        };
        match &self.online {
            None => self.online = Some(now),
            Some(prev) if *prev != now => {
                info!("{NAME}: online CPUs changed from {} to {}", prev.len(), now.len());
                ctx.request_reinit();
            }
            Some(_) => {}
        }
    }

    fn report(&self, ctx: &mut Ctx<'_>) {
        let threshold = ctx.config().greater_than;
        if ctx.config().perins {
            for (&(id, ins), &delta) in &self.deltas {
                if delta > threshold {
                    let line = format!("{:>12} {:<18} {delta}", ctx.describe(ins), self.names[id.0]);
                    ctx.print(&line);
                }
            }
            return;
        }
        let mut totals = vec![0u64; self.names.len()];
        for (&(id, _), &delta) in &self.deltas {
            totals[id.0] = totals[id.0].saturating_add(delta);
        }
        for (name, total) in self.names.iter().zip(totals) {
            if total > threshold {
                ctx.print(&format!("{name:<18} {total}"));
            }
        }
    }
}

impl Monitor for Stat {
    fn name(&self) -> &'static str {
        NAME
    }

    fn about(&self) -> &'static str {
        "count events and print per-interval deltas"
    }

    fn hooks(&self) -> Hooks {
        Hooks { interval: true, read: true, sigusr1: false }
    }

    fn init(&mut self, events: &mut EventList, config: &Config) -> Result<()> {
        if config.interval.is_none() {
            return Err(MonitorError::MissingInterval(NAME).into());
        }
        let requested: Vec<&str> = config.events().collect();
        let names = if requested.is_empty() { DEFAULT_EVENTS.to_vec() } else { requested };

        let mut attrs = Vec::with_capacity(names.len());
        for name in names {
            let Some(attr) = counter_attr(name) else {
                bail!("unknown counter {name:?}");
            };
            attrs.push(attr.exclude(config.exclude_user, config.exclude_kernel, config.exclude_guest));
        }
        for attr in attrs {
            self.names.push(attr.name.clone());
            events.add(attr);
        }
        Ok(())
    }

    fn deinit(&mut self, _events: &mut EventList) {
        self.names.clear();
        self.last.clear();
        self.deltas.clear();
        self.online = None;
    }

    fn read(&mut self, _ctx: &mut Ctx<'_>, event: &Evsel, count: &CounterValue, instance: usize) {
        let value = count.scaled();
        let key = (event.id(), instance);
        let prev = self.last.insert(key, value).unwrap_or(0);
        self.deltas.insert(key, value.saturating_sub(prev));
    }

    fn interval(&mut self, ctx: &mut Ctx<'_>) {
        self.report(ctx);
        self.deltas.clear();
        self.check_online(ctx);
    }
}
