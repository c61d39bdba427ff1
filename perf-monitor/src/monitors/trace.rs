//! `trace`: tracepoint samples
//!
//! Opens every tracepoint named by `-e sys:name[,sys:name...]`, sampling each
//! hit. `--filter` is installed on all of them in the filter stage. Each
//! sample prints one line; with `-g` the kernel call chain follows it. Per
//! interval, the hit count of every tracepoint is printed.
//!
//! Samples of all tracepoints of an instance share one ring, so the event a
//! sample belongs to is recovered from the `common_type` field that starts
//! every tracepoint's raw data.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::config::Config;
use crate::events::{sample, EventAttr, EventList, SampleOn};
use crate::monitor::{Ctx, Hooks, Monitor};
use crate::record::{SampleReader, SampleRecord};

const NAME: &str = "trace";

/// Fields every sample carries.
const SAMPLE_TYPE: u64 = sample::TID | sample::TIME | sample::CPU | sample::PERIOD | sample::RAW;

#[derive(Debug, Default)]
pub struct Trace {
    reader: Option<SampleReader>,
    /// Tracepoint id to (name, hits this interval).
    events: HashMap<u64, (String, u64)>,
    /// Declaration order, for stable reports.
    order: Vec<u64>,
    unknown: u64,
}

impl Trace {
    fn sample_type(config: &Config) -> u64 {
        if config.callchain {
            SAMPLE_TYPE | sample::CALLCHAIN
        } else {
            SAMPLE_TYPE
        }
    }

    fn declare(&mut self, events: &mut EventList, attr: EventAttr) {
        self.order.push(attr.config);
        self.events.insert(attr.config, (attr.name.clone(), 0));
        events.add(attr);
    }
}

/// `common_type` of a tracepoint's raw data.
fn common_type(raw: &[u8]) -> Option<u64> {
    let bytes: [u8; 2] = raw.get(..2)?.try_into().ok()?;
    Some(u64::from(u16::from_ne_bytes(bytes)))
}

#[allow(clippy::cast_precision_loss)]
fn seconds(ns: u64) -> f64 {
    ns as f64 / 1e9
}

impl Monitor for Trace {
    fn name(&self) -> &'static str {
        NAME
    }

    fn about(&self) -> &'static str {
        "print tracepoint samples (-e sys:name)"
    }

    fn mmap_pages(&self) -> usize {
        64
    }

    fn hooks(&self) -> Hooks {
        Hooks { interval: true, read: false, sigusr1: false }
    }

    fn init(&mut self, events: &mut EventList, config: &Config) -> Result<()> {
        let selectors: Vec<&str> = config.events().collect();
        if selectors.is_empty() {
            bail!("{NAME} needs at least one tracepoint: -e sys:name");
        }
        let sample_type = Self::sample_type(config);
        let mut attrs = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let attr = events
                .tracepoint(selector)
                .with_context(|| format!("unknown tracepoint {selector}"))?
                .sample_on(SampleOn::Period(1))
                .with_sample_type(sample_type)
                .exclude(config.exclude_user, config.exclude_kernel, config.exclude_guest)
                .wakeup(1);
            attrs.push(attr);
        }
        for attr in attrs {
            self.declare(events, attr);
        }
        self.reader = Some(SampleReader::new(sample_type));
        Ok(())
    }

    fn filter(&mut self, events: &mut EventList, config: &Config) -> Result<()> {
        let Some(filter) = config.filter.as_deref() else {
            return Ok(());
        };
        let ids: Vec<_> = events.iter().map(|e| e.id()).collect();
        for id in ids {
            events.set_filter(id, filter)?;
        }
        Ok(())
    }

    fn deinit(&mut self, _events: &mut EventList) {
        self.reader = None;
        self.events.clear();
        self.order.clear();
    }

    fn sample(&mut self, ctx: &mut Ctx<'_>, record: &SampleRecord<'_>, instance: usize) {
        let Some(sample) = self.reader.and_then(|r| r.read(record)) else {
            debug!("{NAME}: short sample on {}", ctx.describe(instance));
            return;
        };
        let entry = match common_type(sample.raw) {
            Some(id) => self.events.get_mut(&id),
            None => None,
        };
        let name = match entry {
            Some((name, hits)) => {
                *hits += 1;
                name.as_str()
            }
            None => {
                self.unknown += 1;
                "?"
            }
        };
        let line = format!(
            "{:.6} [{:03}] {}/{} {name}",
            seconds(sample.time.unwrap_or(0)),
            sample.cpu.unwrap_or(0),
            sample.pid.unwrap_or(0),
            sample.tid.unwrap_or(0),
        );
        ctx.print(&line);
        for ip in &sample.callchain {
            ctx.print(&format!("    {ip:#018x}"));
        }
    }

    fn interval(&mut self, ctx: &mut Ctx<'_>) {
        for id in &self.order {
            if let Some((name, hits)) = self.events.get_mut(id) {
                let line = format!("{name} {hits}");
                ctx.print(&line);
                *hits = 0;
            }
        }
        if self.unknown > 0 {
            ctx.print(&format!("unattributed {}", self.unknown));
            self.unknown = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_type() {
        let raw = [0x3c, 0x01, 0xff, 0xff];
        assert_eq!(common_type(&raw), Some(u64::from(u16::from_ne_bytes([0x3c, 0x01]))));
        assert_eq!(common_type(&[1]), None);
    }

    #[test]
    fn test_callchain_follows_flag() {
        let plain = Trace::sample_type(&Config::default());
        assert_eq!(plain & sample::CALLCHAIN, 0);
        let config = Config { callchain: true, ..Config::default() };
        assert_ne!(Trace::sample_type(&config) & sample::CALLCHAIN, 0);
    }

    #[test]
    fn test_requires_tracepoints() {
        let mut trace = Trace::default();
        let mut events = EventList::new(Box::new(crate::events::PerfDriver::new()));
        let err = trace.init(&mut events, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("-e sys:name"));
    }
}
