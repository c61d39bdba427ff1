//! Monitor registry
//!
//! Built once at startup; monitors are looked up by exact name and live for
//! the rest of the process.

use std::collections::HashMap;

use log::warn;

use super::Monitor;
use crate::domain::MonitorError;

#[derive(Default)]
pub struct Registry {
    monitors: HashMap<&'static str, Box<dyn Monitor>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a monitor under its own name. A later registration under the same
    /// name replaces the earlier one.
    pub fn register(&mut self, monitor: Box<dyn Monitor>) {
        let name = monitor.name();
        if self.monitors.insert(name, monitor).is_some() {
            warn!("monitor {name} registered twice, keeping the last one");
        }
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&dyn Monitor> {
        self.monitors.get(name).map(AsRef::as_ref)
    }

    /// Exact lookup for running the monitor.
    ///
    /// # Errors
    /// Returns [`MonitorError::UnknownMonitor`] if no monitor has that name.
    pub fn select(&mut self, name: &str) -> Result<&mut dyn Monitor, MonitorError> {
        match self.monitors.get_mut(name) {
            Some(monitor) => Ok(monitor.as_mut()),
            None => Err(MonitorError::UnknownMonitor(name.to_string())),
        }
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.monitors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}
