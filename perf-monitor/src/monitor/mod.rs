//! # Monitor plugin contract
//!
//! A monitor declares the events it needs in [`Monitor::init`] and reacts to
//! what the engine delivers: ring-buffer records (one method per record
//! kind), counter values in [`Monitor::read`], and the periodic
//! [`Monitor::interval`] tick.
//!
//! Record methods default to the diagnostic printer in [`display`], so a
//! monitor overrides only the kinds it cares about. Samples, throttle and
//! unthrottle have no default output.
//!
//! - `context`: [`Ctx`], the per-callback view of the running session
//! - `display`: default diagnostic lines
//! - `registry`: lookup of monitors by name

pub mod context;
pub mod display;
pub mod registry;

use anyhow::Result;

use crate::config::Config;
use crate::events::{CounterValue, EventList, Evsel};
use crate::record::{
    CommRecord, LostRecord, SampleRecord, SwitchCpuWideRecord, SwitchRecord, TaskRecord,
    ThrottleRecord,
};

pub use context::Ctx;
pub use registry::Registry;

/// Optional callbacks a monitor implements.
///
/// The engine skips the work behind a hook entirely when it is not
/// declared: no counter reads without `read`, no SIGUSR1 handler without
/// `sigusr1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hooks {
    pub interval: bool,
    pub read: bool,
    pub sigusr1: bool,
}

pub trait Monitor {
    /// Registry key; matched exactly against the command line.
    fn name(&self) -> &'static str;

    /// One line description for `--list`.
    fn about(&self) -> &'static str {
        ""
    }

    /// Ring-buffer data pages per instance; 0 for pull-only monitors.
    /// `-m` overrides a non-zero choice.
    fn mmap_pages(&self) -> usize {
        0
    }

    fn hooks(&self) -> Hooks {
        Hooks::default()
    }

    /// Declare events against the bound targets.
    ///
    /// # Errors
    /// Any error aborts this lifecycle pass.
    fn init(&mut self, events: &mut EventList, config: &Config) -> Result<()>;

    /// Attach filters once events are open.
    ///
    /// # Errors
    /// Any error aborts this lifecycle pass.
    fn filter(&mut self, _events: &mut EventList, _config: &Config) -> Result<()> {
        Ok(())
    }

    /// Undo `init`. Called whenever `init` succeeded, even if a later
    /// stage failed.
    fn deinit(&mut self, _events: &mut EventList) {}

    fn interval(&mut self, _ctx: &mut Ctx<'_>) {}

    /// One counter value per event and instance, once per interval.
    fn read(&mut self, _ctx: &mut Ctx<'_>, _event: &Evsel, _count: &CounterValue, _instance: usize) {
    }

    /// SIGUSR1 was delivered; runs on the dispatch thread.
    fn sigusr1(&mut self, _ctx: &mut Ctx<'_>) {}

    fn lost(&mut self, ctx: &mut Ctx<'_>, record: &LostRecord, instance: usize) {
        display::lost(ctx, record, instance);
    }

    fn fork(&mut self, ctx: &mut Ctx<'_>, record: &TaskRecord, instance: usize) {
        display::fork_exit(ctx, record, instance, false);
    }

    fn exit(&mut self, ctx: &mut Ctx<'_>, record: &TaskRecord, instance: usize) {
        display::fork_exit(ctx, record, instance, true);
    }

    fn comm(&mut self, ctx: &mut Ctx<'_>, record: &CommRecord<'_>, instance: usize) {
        display::comm(ctx, record, instance);
    }

    fn throttle(&mut self, _ctx: &mut Ctx<'_>, _record: &ThrottleRecord, _instance: usize) {}

    fn unthrottle(&mut self, _ctx: &mut Ctx<'_>, _record: &ThrottleRecord, _instance: usize) {}

    fn sample(&mut self, _ctx: &mut Ctx<'_>, _record: &SampleRecord<'_>, _instance: usize) {}

    fn context_switch(&mut self, ctx: &mut Ctx<'_>, record: &SwitchRecord, instance: usize) {
        display::context_switch(ctx, record, instance);
    }

    fn context_switch_cpu_wide(
        &mut self,
        ctx: &mut Ctx<'_>,
        record: &SwitchCpuWideRecord,
        instance: usize,
    ) {
        display::context_switch_cpu_wide(ctx, record, instance);
    }
}
