//! Host interfaces consumed by the engine
//!
//! CPU enumeration and thread lookup come from sysfs/procfs; counters come
//! from an [`EventDriver`]. Everything the engine needs from the machine goes
//! through [`Host`], so the lifecycle and dispatch loop can run against an
//! in-memory host in tests.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::domain::{CpuId, MonitorError, Tid};
use crate::events::{EventDriver, PerfDriver};
use crate::targets::parse_cpu_list;

pub trait Host {
    /// Online CPUs, ascending.
    ///
    /// # Errors
    /// Returns an error if the online set cannot be read or parsed.
    fn online_cpus(&self) -> Result<Vec<CpuId>, MonitorError>;

    /// Check that `tid` names a live process or thread.
    ///
    /// # Errors
    /// Returns [`MonitorError::ThreadNotFound`] if it does not.
    fn resolve_thread(&self, tid: Tid) -> Result<(), MonitorError>;

    /// Fresh driver for one lifecycle pass.
    fn new_driver(&self) -> Box<dyn EventDriver>;
}

/// The running Linux system.
#[derive(Debug, Clone)]
pub struct SysHost {
    sysfs: PathBuf,
    procfs: PathBuf,
}

impl Default for SysHost {
    fn default() -> Self {
        Self { sysfs: PathBuf::from("/sys"), procfs: PathBuf::from("/proc") }
    }
}

impl SysHost {
    /// Host rooted at alternative sysfs/procfs mounts.
    #[must_use]
    pub fn with_roots(sysfs: impl Into<PathBuf>, procfs: impl Into<PathBuf>) -> Self {
        Self { sysfs: sysfs.into(), procfs: procfs.into() }
    }
}

impl Host for SysHost {
    /// Get list of online CPU IDs from /sys/devices/system/cpu/online
    ///
    /// The format in /sys is like "0-3" or "0-3,8-11" for NUMA systems.
    fn online_cpus(&self) -> Result<Vec<CpuId>, MonitorError> {
        let path = self.sysfs.join("devices/system/cpu/online");
        let content = fs::read_to_string(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to read {}: {e}", path.display()))
        })?;
        parse_cpu_list(&content).map_err(|e| {
            MonitorError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
        })
    }

    fn resolve_thread(&self, tid: Tid) -> Result<(), MonitorError> {
        if self.procfs.join(tid.0.to_string()).exists() {
            Ok(())
        } else {
            Err(MonitorError::ThreadNotFound(tid))
        }
    }

    fn new_driver(&self) -> Box<dyn EventDriver> {
        Box::new(PerfDriver::new())
    }
}
