//! `task-watch`: process lifecycle side-band
//!
//! Streaming monitor built on a dummy software event that only carries
//! side-band records. Fork and exit records are counted here; comm and
//! context-switch records fall through to the default printer. Counts are
//! printed every interval and the running totals on SIGUSR1.

use anyhow::Result;

use crate::config::Config;
use crate::events::{sw, EventAttr, EventList};
use crate::monitor::{Ctx, Hooks, Monitor};
use crate::record::TaskRecord;

const NAME: &str = "task-watch";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    forks: u64,
    exits: u64,
}

impl Counts {
    fn is_zero(self) -> bool {
        self.forks == 0 && self.exits == 0
    }
}

#[derive(Debug, Default)]
pub struct TaskWatch {
    /// Current interval, per instance.
    interval: Vec<Counts>,
    /// Since start, surviving reinitialization.
    total: Counts,
}

impl TaskWatch {
    fn slot(&mut self, ins: usize) -> &mut Counts {
        if self.interval.len() <= ins {
            self.interval.resize(ins + 1, Counts::default());
        }
        &mut self.interval[ins]
    }

    fn summary(counts: Counts) -> String {
        format!("forks {} exits {}", counts.forks, counts.exits)
    }
}

impl Monitor for TaskWatch {
    fn name(&self) -> &'static str {
        NAME
    }

    fn about(&self) -> &'static str {
        "count fork/exit and print comm/switch side-band records"
    }

    fn mmap_pages(&self) -> usize {
        8
    }

    fn hooks(&self) -> Hooks {
        Hooks { interval: true, read: false, sigusr1: true }
    }

    fn init(&mut self, events: &mut EventList, config: &Config) -> Result<()> {
        let attr = EventAttr::software("dummy", sw::DUMMY)
            .side_band(true, true, true)
            .exclude(config.exclude_user, config.exclude_kernel, config.exclude_guest)
            .wakeup(1);
        events.add(attr);
        self.interval = vec![Counts::default(); events.targets().instance_count()];
        Ok(())
    }

    fn deinit(&mut self, _events: &mut EventList) {
        self.interval.clear();
    }

    fn fork(&mut self, _ctx: &mut Ctx<'_>, _record: &TaskRecord, instance: usize) {
        self.slot(instance).forks += 1;
        self.total.forks += 1;
    }

    fn exit(&mut self, _ctx: &mut Ctx<'_>, _record: &TaskRecord, instance: usize) {
        self.slot(instance).exits += 1;
        self.total.exits += 1;
    }

    fn interval(&mut self, ctx: &mut Ctx<'_>) {
        if ctx.config().perins {
            for (ins, counts) in self.interval.iter().enumerate() {
                if !counts.is_zero() {
                    let line = format!("{} {}", ctx.describe(ins), Self::summary(*counts));
                    ctx.print(&line);
                }
            }
        } else {
            let sum = self.interval.iter().fold(Counts::default(), |acc, c| Counts {
                forks: acc.forks + c.forks,
                exits: acc.exits + c.exits,
            });
            ctx.print(&Self::summary(sum));
        }
        self.interval.iter_mut().for_each(|c| *c = Counts::default());
    }

    fn sigusr1(&mut self, ctx: &mut Ctx<'_>) {
        ctx.print(&format!("total {}", Self::summary(self.total)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_grow_on_demand() {
        let mut watch = TaskWatch::default();
        watch.slot(3).forks += 1;
        assert_eq!(watch.interval.len(), 4);
        assert_eq!(watch.interval[3], Counts { forks: 1, exits: 0 });
    }

    #[test]
    fn test_streams_side_band() {
        let watch = TaskWatch::default();
        assert!(watch.mmap_pages() > 0);
        assert!(watch.hooks().sigusr1);
        assert!(!watch.hooks().read);
    }
}
