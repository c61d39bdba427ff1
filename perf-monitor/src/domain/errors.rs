//! Structured error types for perf-monitor
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Configuration errors are the user's to fix; stage errors name the
//! lifecycle step and monitor that failed; record errors are only ever
//! logged by the dispatch loop.

use std::fmt;

use super::types::Tid;
use thiserror::Error;

/// Steps of the event-source lifecycle, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Construct,
    BindTargets,
    Init,
    Open,
    Filter,
    Map,
    Enable,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Construct => "construct",
            Stage::BindTargets => "bind targets",
            Stage::Init => "init",
            Stage::Open => "open",
            Stage::Filter => "filter",
            Stage::Map => "mmap",
            Stage::Enable => "enable",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("unknown monitor: {0}")]
    UnknownMonitor(String),

    #[error("invalid CPU list {list:?}: {reason}")]
    InvalidCpuList { list: String, reason: String },

    #[error("no online CPUs match {0:?}")]
    NoOnlineCpus(String),

    #[error("invalid process list {list:?}: {reason}")]
    InvalidThreadList { list: String, reason: String },

    #[error("{0} not found")]
    ThreadNotFound(Tid),

    #[error("--pids and --cpu cannot be combined")]
    ConflictingTargets,

    #[error("monitor({0}) requires an interval (-i)")]
    MissingInterval(&'static str),

    #[error("monitor({monitor}) {stage} failed: {source:#}")]
    Stage {
        monitor: &'static str,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown perf record type {0}")]
    UnknownRecord(u32),

    #[error("truncated perf record type {kind}: {len} bytes")]
    TruncatedRecord { kind: u32, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether the error stems from user input rather than the host.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            MonitorError::UnknownMonitor(_)
                | MonitorError::InvalidCpuList { .. }
                | MonitorError::NoOnlineCpus(_)
                | MonitorError::InvalidThreadList { .. }
                | MonitorError::ThreadNotFound(_)
                | MonitorError::ConflictingTargets
                | MonitorError::MissingInterval(_)
        )
    }
}
