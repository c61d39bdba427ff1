//! Target binding and instance addressing
//!
//! A monitor runs either against a set of CPUs or against a list of
//! threads, never both. The bound pair of maps keeps a placeholder on the
//! unused side so counters can always be addressed as (cpu, thread).
//! Instances number the real side: the i-th CPU in ascending order, or the
//! i-th thread in the order the user supplied them.

use std::collections::HashSet;

use crate::config::Config;
use crate::domain::{CpuId, MonitorError, Tid};
use crate::host::Host;

/// CPU side of the target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuMap {
    /// Placeholder: counters follow their thread onto any CPU.
    Any,
    /// Ascending, de-duplicated CPU ids.
    Cpus(Vec<CpuId>),
}

impl CpuMap {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CpuMap::Any => 1,
            CpuMap::Cpus(cpus) => cpus.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry `idx` of the map; `None` is the placeholder.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<CpuId> {
        match self {
            CpuMap::Any => None,
            CpuMap::Cpus(cpus) => cpus.get(idx).copied(),
        }
    }
}

/// Thread side of the target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadMap {
    /// Placeholder: counters observe every task on their CPU.
    Any,
    /// Thread ids in the order they were requested.
    Threads(Vec<Tid>),
}

impl ThreadMap {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ThreadMap::Any => 1,
            ThreadMap::Threads(threads) => threads.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Tid> {
        match self {
            ThreadMap::Any => None,
            ThreadMap::Threads(threads) => threads.get(idx).copied(),
        }
    }
}

/// The CPU/thread pair bound to the active monitor for one lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    cpus: CpuMap,
    threads: ThreadMap,
}

impl Targets {
    #[must_use]
    pub fn cpus(cpus: Vec<CpuId>) -> Self {
        Self { cpus: CpuMap::Cpus(cpus), threads: ThreadMap::Any }
    }

    #[must_use]
    pub fn threads(threads: Vec<Tid>) -> Self {
        Self { cpus: CpuMap::Any, threads: ThreadMap::Threads(threads) }
    }

    /// Resolve the configured process list or CPU list against the host.
    ///
    /// # Errors
    /// Returns a configuration error when the lists are malformed, name
    /// threads that do not exist, match no online CPU, or are both given.
    pub fn bind(config: &Config, host: &dyn Host) -> Result<Self, MonitorError> {
        match (config.pids.as_deref(), config.cpus.as_deref()) {
            (Some(_), Some(_)) => Err(MonitorError::ConflictingTargets),
            (Some(pids), None) => {
                let threads = parse_thread_list(pids)?;
                for tid in &threads {
                    host.resolve_thread(*tid)?;
                }
                Ok(Self::threads(threads))
            }
            (None, mask) => {
                let online = host.online_cpus()?;
                let wanted = match mask {
                    Some(list) => parse_cpu_list(list)?,
                    None => online.clone(),
                };
                let online: HashSet<CpuId> = online.into_iter().collect();
                let cpus: Vec<CpuId> = wanted.into_iter().filter(|c| online.contains(c)).collect();
                if cpus.is_empty() {
                    return Err(MonitorError::NoOnlineCpus(mask.unwrap_or("all").to_string()));
                }
                Ok(Self::cpus(cpus))
            }
        }
    }

    #[must_use]
    pub fn cpu_map(&self) -> &CpuMap {
        &self.cpus
    }

    #[must_use]
    pub fn thread_map(&self) -> &ThreadMap {
        &self.threads
    }

    /// Whether instances are CPUs (true) or threads (false).
    #[must_use]
    pub fn is_cpu_scoped(&self) -> bool {
        matches!(self.cpus, CpuMap::Cpus(_))
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        if self.is_cpu_scoped() {
            self.cpus.len()
        } else {
            self.threads.len()
        }
    }

    /// CPU behind instance `ins`; `None` when thread-scoped or out of range.
    #[must_use]
    pub fn instance_to_cpu(&self, ins: usize) -> Option<CpuId> {
        self.cpus.get(ins)
    }

    /// Thread behind instance `ins`; `None` when CPU-scoped or out of range.
    #[must_use]
    pub fn instance_to_thread(&self, ins: usize) -> Option<Tid> {
        self.threads.get(ins)
    }

    /// Human readable name of an instance, e.g. `CPU #2` or `thread #4242`.
    #[must_use]
    pub fn describe(&self, ins: usize) -> String {
        let resolved = if self.is_cpu_scoped() {
            self.instance_to_cpu(ins).map(|c| c.to_string())
        } else {
            self.instance_to_thread(ins).map(|t| t.to_string())
        };
        resolved.unwrap_or_else(|| format!("instance #{ins}"))
    }
}

/// Upper bound (exclusive) on CPU ids accepted in a CPU list.
pub const MAX_NR_CPUS: u32 = 4096;

/// Parse a kernel style CPU list (`0-3,8,10-11`).
///
/// The result is ascending with duplicates removed.
///
/// # Errors
/// Returns [`MonitorError::InvalidCpuList`] for empty items, non-numeric
/// values, reversed ranges or ids of [`MAX_NR_CPUS`] and above.
pub fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>, MonitorError> {
    let invalid = |reason: String| MonitorError::InvalidCpuList { list: list.to_string(), reason };
    let parse = |s: &str| {
        let cpu = s.trim().parse::<u32>().map_err(|e| invalid(format!("{s:?}: {e}")))?;
        if cpu >= MAX_NR_CPUS {
            return Err(invalid(format!("cpu {cpu} out of range (max {})", MAX_NR_CPUS - 1)));
        }
        Ok(cpu)
    };

    let mut cpus = Vec::new();
    for range in list.trim().split(',') {
        if range.trim().is_empty() {
            return Err(invalid("empty item".to_string()));
        }
        if let Some((start, end)) = range.split_once('-') {
            // Range like "0-3"
            let start = parse(start)?;
            let end = parse(end)?;
            if end < start {
                return Err(invalid(format!("reversed range {range}")));
            }
            cpus.extend((start..=end).map(CpuId));
        } else {
            // Single CPU like "5"
            cpus.push(CpuId(parse(range)?));
        }
    }

    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Parse a comma separated process/thread list, keeping the first
/// occurrence of each id.
///
/// # Errors
/// Returns [`MonitorError::InvalidThreadList`] for empty or non-numeric items.
pub fn parse_thread_list(list: &str) -> Result<Vec<Tid>, MonitorError> {
    let mut seen = HashSet::new();
    let mut threads = Vec::new();
    for item in list.split(',') {
        let tid = item.trim().parse::<u32>().map_err(|e| MonitorError::InvalidThreadList {
            list: list.to_string(),
            reason: format!("{:?}: {e}", item.trim()),
        })?;
        if seen.insert(tid) {
            threads.push(Tid(tid));
        }
    }
    Ok(threads)
}
