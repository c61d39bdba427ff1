//! Staged event-source lifecycle
//!
//! A [`Session`] walks a monitor through construct, bind targets, init,
//! open, filter, map and enable. It remembers the last stage that
//! completed, and dropping it undoes exactly those stages in reverse:
//! disable, unmap, close, deinit, delete the aggregate, release targets.
//! A failed stage therefore leaves nothing behind.

use log::debug;

use crate::config::Config;
use crate::domain::{MonitorError, Stage};
use crate::events::EventList;
use crate::host::Host;
use crate::monitor::Monitor;
use crate::targets::Targets;

pub(crate) struct Session<'m> {
    pub(super) monitor: &'m mut dyn Monitor,
    pub(super) events: EventList,
    /// Last stage that completed.
    pub(super) stage: Stage,
    pub(super) reinit: bool,
}

impl<'m> Session<'m> {
    /// Bring `monitor` up to the enable stage.
    ///
    /// # Errors
    /// Target binding errors are returned as they are; every other failing
    /// stage is reported as [`MonitorError::Stage`]. Whatever was acquired
    /// before the failure has been released by the time this returns.
    pub(crate) fn start(
        monitor: &'m mut dyn Monitor,
        config: &Config,
        host: &dyn Host,
        pages: usize,
    ) -> Result<Self, MonitorError> {
        let name = monitor.name();
        let events = EventList::new(host.new_driver());
        let mut session = Session { monitor, events, stage: Stage::Construct, reinit: false };
        debug!("monitor({name}) constructed");

        let targets = Targets::bind(config, host)?;
        debug!(
            "monitor({name}) bound {} instance(s), {} scoped",
            targets.instance_count(),
            if targets.is_cpu_scoped() { "cpu" } else { "thread" }
        );
        session.events.set_targets(targets);
        session.stage = Stage::BindTargets;

        session.monitor.init(&mut session.events, config).map_err(stage_err(name, Stage::Init))?;
        session.stage = Stage::Init;
        debug!("monitor({name}) init declared {} event(s)", session.events.len());

        session.events.open().map_err(stage_err(name, Stage::Open))?;
        session.stage = Stage::Open;
        debug!("monitor({name}) opened");

        session.monitor.filter(&mut session.events, config).map_err(stage_err(name, Stage::Filter))?;
        session.stage = Stage::Filter;
        debug!("monitor({name}) filters installed");

        if pages > 0 {
            session.events.mmap(pages).map_err(stage_err(name, Stage::Map))?;
            debug!("monitor({name}) mapped {pages} pages per instance");
        }
        session.stage = Stage::Map;

        session.events.enable().map_err(stage_err(name, Stage::Enable))?;
        session.stage = Stage::Enable;
        debug!("monitor({name}) enabled {} event(s)", session.events.len());

        Ok(session)
    }
}

fn stage_err(monitor: &'static str, stage: Stage) -> impl FnOnce(anyhow::Error) -> MonitorError {
    move |source| MonitorError::Stage { monitor, stage, source }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let name = self.monitor.name();
        if self.stage >= Stage::Enable {
            self.events.disable();
            debug!("monitor({name}) disabled");
        }
        if self.stage >= Stage::Map && self.events.is_mapped() {
            self.events.unmap();
            debug!("monitor({name}) unmapped");
        }
        if self.stage >= Stage::Open {
            self.events.close();
            debug!("monitor({name}) closed");
        }
        if self.stage >= Stage::Init {
            self.monitor.deinit(&mut self.events);
            debug!("monitor({name}) deinit");
        }
        self.events.clear();
        debug!("monitor({name}) event list deleted");
        if self.stage >= Stage::BindTargets {
            drop(self.events.take_targets());
            debug!("monitor({name}) targets released");
        }
    }
}
