//! Per-callback view of the running session.

use std::io::Write;

use log::debug;

use crate::config::Config;
use crate::domain::{CpuId, MonitorError, Tid};
use crate::host::Host;
use crate::targets::Targets;

/// Handed to every runtime callback. Valid for the duration of the call
/// only: the targets behind it are rebuilt on reinitialization.
pub struct Ctx<'a> {
    targets: &'a Targets,
    config: &'a Config,
    host: &'a dyn Host,
    out: &'a mut dyn Write,
    reinit: &'a mut bool,
}

impl<'a> Ctx<'a> {
    pub fn new(
        targets: &'a Targets,
        config: &'a Config,
        host: &'a dyn Host,
        out: &'a mut dyn Write,
        reinit: &'a mut bool,
    ) -> Self {
        Self { targets, config, host, out, reinit }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        self.config
    }

    #[must_use]
    pub fn targets(&self) -> &Targets {
        self.targets
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.targets.instance_count()
    }

    #[must_use]
    pub fn is_cpu_scoped(&self) -> bool {
        self.targets.is_cpu_scoped()
    }

    #[must_use]
    pub fn instance_to_cpu(&self, ins: usize) -> Option<CpuId> {
        self.targets.instance_to_cpu(ins)
    }

    #[must_use]
    pub fn instance_to_thread(&self, ins: usize) -> Option<Tid> {
        self.targets.instance_to_thread(ins)
    }

    /// `CPU #n` or `thread #n`.
    #[must_use]
    pub fn describe(&self, ins: usize) -> String {
        self.targets.describe(ins)
    }

    /// Currently online CPUs, straight from the host.
    ///
    /// # Errors
    /// Returns an error if the host cannot enumerate CPUs.
    pub fn online_cpus(&self) -> Result<Vec<CpuId>, MonitorError> {
        self.host.online_cpus()
    }

    /// Tear down and rebuild every event source once the current loop
    /// iteration finishes.
    pub fn request_reinit(&mut self) {
        *self.reinit = true;
    }

    /// Write one line, prefixed with the wall-clock time.
    pub fn print(&mut self, line: &str) {
        let stamp = super::display::timestamp();
        if let Err(e) = writeln!(self.out, "{stamp} {line}") {
            debug!("failed to write report line: {e}");
        }
    }
}
