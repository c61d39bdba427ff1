//! The event-list aggregate
//!
//! Holds the declared events, the bound [`Targets`], one counter per
//! (event, cpu, thread) once opened, and one ring buffer per instance once
//! mapped. Every bulk operation is all-or-nothing: a failure part way
//! releases what that operation acquired before returning.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::attr::split_tracepoint;
use super::{CounterValue, EventAttr, EventDriver, RingBuffer};
use crate::domain::{CounterId, EventId};
use crate::targets::Targets;

/// A declared event and its opened counters.
pub struct Evsel {
    attr: EventAttr,
    id: EventId,
    /// Indexed `cpu_idx * nr_threads + thread_idx`.
    counters: Vec<CounterId>,
}

impl Evsel {
    #[must_use]
    pub fn attr(&self) -> &EventAttr {
        &self.attr
    }

    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.attr.name
    }
}

pub(crate) struct Ring {
    pub(crate) instance: usize,
    pub(crate) buffer: Box<dyn RingBuffer>,
}

pub struct EventList {
    driver: Box<dyn EventDriver>,
    targets: Targets,
    evsels: Vec<Evsel>,
    rings: Vec<Ring>,
    pollable: Vec<CounterId>,
}

impl EventList {
    /// Empty aggregate with no targets bound yet.
    #[must_use]
    pub fn new(driver: Box<dyn EventDriver>) -> Self {
        Self {
            driver,
            targets: Targets::cpus(Vec::new()),
            evsels: Vec::new(),
            rings: Vec::new(),
            pollable: Vec::new(),
        }
    }

    pub(crate) fn set_targets(&mut self, targets: Targets) {
        self.targets = targets;
    }

    pub(crate) fn take_targets(&mut self) -> Targets {
        std::mem::replace(&mut self.targets, Targets::cpus(Vec::new()))
    }

    #[must_use]
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Declare an event; it is opened on every target by the open stage.
    pub fn add(&mut self, attr: EventAttr) -> EventId {
        let id = EventId(self.evsels.len());
        self.evsels.push(Evsel { attr, id, counters: Vec::new() });
        id
    }

    /// Declaration for tracepoint `sys:name`, id resolved by the driver.
    ///
    /// # Errors
    /// Returns an error if the selector is malformed or the tracepoint is
    /// unknown.
    pub fn tracepoint(&self, selector: &str) -> io::Result<EventAttr> {
        let (system, name) = split_tracepoint(selector)?;
        let id = self.driver.tracepoint_id(system, name)?;
        Ok(EventAttr::tracepoint(selector, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evsel> {
        self.evsels.iter()
    }

    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&Evsel> {
        self.evsels.get(id.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.evsels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evsels.is_empty()
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        !self.rings.is_empty()
    }

    /// Open every declared event against every bound (cpu, thread) pair.
    pub(crate) fn open(&mut self) -> Result<()> {
        let nr_cpus = self.targets.cpu_map().len();
        let nr_threads = self.targets.thread_map().len();

        for idx in 0..self.evsels.len() {
            for cpu_idx in 0..nr_cpus {
                for thread_idx in 0..nr_threads {
                    let cpu = self.targets.cpu_map().get(cpu_idx);
                    let thread = self.targets.thread_map().get(thread_idx);
                    let evsel = &self.evsels[idx];
                    match self.driver.open(&evsel.attr, cpu, thread) {
                        Ok(counter) => self.evsels[idx].counters.push(counter),
                        Err(e) => {
                            let name = evsel.attr.name.clone();
                            self.close();
                            return Err(e).with_context(|| {
                                format!(
                                    "failed to open {name} on cpu {} thread {}",
                                    cpu.map_or(-1, |c| i64::from(c.0)),
                                    thread.map_or(-1, |t| i64::from(t.0)),
                                )
                            });
                        }
                    }
                }
            }
        }
        debug!(
            "opened {} events on {} cpu x {} thread slots",
            self.evsels.len(),
            nr_cpus,
            nr_threads
        );
        Ok(())
    }

    /// Install a kernel filter on every counter of `id`.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown or the kernel rejects the filter.
    pub fn set_filter(&mut self, id: EventId, filter: &str) -> Result<()> {
        let evsel = self.evsels.get(id.0).context("unknown event")?;
        for counter in &evsel.counters {
            self.driver
                .set_filter(*counter, filter)
                .with_context(|| format!("failed to set filter {filter:?} on {}", evsel.attr.name))?;
        }
        Ok(())
    }

    /// Counters belonging to instance `ins`.
    fn instance_counters(&self, ins: usize) -> Vec<CounterId> {
        let nr_threads = self.targets.thread_map().len();
        let cpu_scoped = self.targets.is_cpu_scoped();
        let mut counters = Vec::new();
        for evsel in &self.evsels {
            if cpu_scoped {
                let start = ins * nr_threads;
                counters.extend(evsel.counters.iter().skip(start).take(nr_threads));
            } else {
                counters.extend(evsel.counters.iter().skip(ins).step_by(nr_threads));
            }
        }
        counters
    }

    /// Map one ring buffer per instance and redirect the instance's other
    /// counters into it.
    pub(crate) fn mmap(&mut self, pages: usize) -> Result<()> {
        for ins in 0..self.targets.instance_count() {
            let counters = self.instance_counters(ins);
            let Some((&leader, rest)) = counters.split_first() else {
                continue;
            };
            let mapped = self.driver.mmap(leader, pages).and_then(|buffer| {
                for counter in rest {
                    self.driver.set_output(*counter, leader)?;
                }
                Ok(buffer)
            });
            match mapped {
                Ok(buffer) => {
                    self.rings.push(Ring { instance: ins, buffer });
                    self.pollable.push(leader);
                }
                Err(e) => {
                    self.unmap();
                    return Err(e).with_context(|| {
                        format!("failed to mmap {pages} pages for {}", self.targets.describe(ins))
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn unmap(&mut self) {
        self.rings.clear();
        self.pollable.clear();
    }

    pub(crate) fn enable(&mut self) -> Result<()> {
        let mut failed = None;
        'outer: for evsel in &self.evsels {
            for counter in &evsel.counters {
                if let Err(e) = self.driver.enable(*counter) {
                    failed = Some((e, evsel.attr.name.clone()));
                    break 'outer;
                }
            }
        }
        match failed {
            None => Ok(()),
            Some((e, name)) => {
                self.disable();
                Err(e).with_context(|| format!("failed to enable {name}"))
            }
        }
    }

    pub(crate) fn disable(&mut self) {
        for evsel in &self.evsels {
            for counter in &evsel.counters {
                if let Err(e) = self.driver.disable(*counter) {
                    debug!("failed to disable {}: {e}", evsel.attr.name);
                }
            }
        }
    }

    pub(crate) fn close(&mut self) {
        for evsel in &mut self.evsels {
            for counter in evsel.counters.drain(..) {
                self.driver.close(counter);
            }
        }
    }

    /// Drop every declared event, releasing whatever is still open.
    pub(crate) fn clear(&mut self) {
        self.unmap();
        self.close();
        self.evsels.clear();
    }

    /// Wait for ring-buffer readiness. Returns the number of ready rings.
    pub(crate) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let outcome = self.driver.poll(&self.pollable, timeout)?;
        if !outcome.hangups.is_empty() {
            warn!("{} event source(s) hung up, no longer polling them", outcome.hangups.len());
            self.pollable.retain(|c| !outcome.hangups.contains(c));
        }
        Ok(outcome.ready)
    }

    /// Read the counter of `evsel` at (`cpu_idx`, `thread_idx`).
    pub(crate) fn read(
        &mut self,
        evsel: EventId,
        cpu_idx: usize,
        thread_idx: usize,
    ) -> io::Result<CounterValue> {
        let nr_threads = self.targets.thread_map().len();
        let counter = self
            .evsels
            .get(evsel.0)
            .and_then(|e| e.counters.get(cpu_idx * nr_threads + thread_idx))
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "counter not open"))?;
        self.driver.read(counter)
    }

    /// Split borrow used by the drain: rings mutably, the rest shared.
    pub(crate) fn rings_and_targets(&mut self) -> (&mut [Ring], &Targets) {
        (&mut self.rings, &self.targets)
    }
}

impl Drop for EventList {
    fn drop(&mut self) {
        self.unmap();
        self.close();
    }
}
