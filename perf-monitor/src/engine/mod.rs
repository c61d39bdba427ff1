//! # Monitor runtime
//!
//! [`Engine::run`] drives one monitor until it is told to stop:
//!
//! 1. start a [`lifecycle::Session`] (construct through enable)
//! 2. run the dispatch loop in `event_loop`
//! 3. tear the session down
//! 4. if a callback requested reinitialization, go back to 1 with freshly
//!    bound targets; otherwise return
//!
//! Stop and SIGUSR1 arrive as flags set from signal context; the loop
//! checks them between waits, so every callback runs on the calling thread.

mod counters;
mod deadline;
mod dispatch;
mod event_loop;
mod lifecycle;

use std::io::{self, Write};
use std::sync::atomic::AtomicBool;

use log::{debug, info};

use crate::config::Config;
use crate::domain::MonitorError;
use crate::host::Host;
use crate::monitor::Monitor;

use event_loop::LoopExit;
use lifecycle::Session;

/// Everything the loop borrows from the engine for one session.
pub(crate) struct Env<'a> {
    pub(crate) config: &'a Config,
    pub(crate) host: &'a dyn Host,
    pub(crate) out: &'a mut dyn Write,
    pub(crate) stop: &'a AtomicBool,
    pub(crate) usr1: &'a AtomicBool,
}

pub struct Engine<'a> {
    config: &'a Config,
    host: &'a dyn Host,
    out: Box<dyn Write + 'a>,
    stop: &'a AtomicBool,
    usr1: &'a AtomicBool,
}

impl<'a> Engine<'a> {
    /// Engine reporting to stdout.
    pub fn new(
        config: &'a Config,
        host: &'a dyn Host,
        stop: &'a AtomicBool,
        usr1: &'a AtomicBool,
    ) -> Self {
        Self { config, host, out: Box::new(io::stdout()), stop, usr1 }
    }

    /// Send monitor reports to `out` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, out: impl Write + 'a) -> Self {
        self.out = Box::new(out);
        self
    }

    /// Ring-buffer pages per instance for `monitor`: 0 for pull-only
    /// monitors, otherwise `-m` if given, else the monitor's own choice.
    #[must_use]
    pub fn pages_for(&self, monitor: &dyn Monitor) -> usize {
        match monitor.mmap_pages() {
            0 => 0,
            own if self.config.mmap_pages == 0 => own,
            _ => self.config.mmap_pages,
        }
    }

    /// Run `monitor` until stopped. Returns the number of lifecycle passes,
    /// one more than the number of reinitializations.
    ///
    /// # Errors
    /// Any lifecycle failure, including one while rebuilding after a
    /// reinitialization request, ends the run.
    pub fn run(&mut self, monitor: &mut dyn Monitor) -> Result<usize, MonitorError> {
        let name = monitor.name();
        let pages = self.pages_for(monitor);
        let mut passes = 0;

        loop {
            passes += 1;
            let exit = {
                let mut session = Session::start(&mut *monitor, self.config, self.host, pages)?;
                let mut env = Env {
                    config: self.config,
                    host: self.host,
                    out: &mut *self.out,
                    stop: self.stop,
                    usr1: self.usr1,
                };
                session.run(&mut env)
            };
            if let Err(e) = self.out.flush() {
                debug!("failed to flush output: {e}");
            }
            match exit {
                LoopExit::Stopped => {
                    info!("monitor({name}) stopped after {passes} pass(es)");
                    return Ok(passes);
                }
                LoopExit::Reinit => info!("monitor({name}) reinitializing"),
            }
        }
    }
}
