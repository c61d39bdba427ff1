//! Event declarations
//!
//! [`EventAttr`] is the plugin-facing description of one perf event. It is
//! translated into a kernel `perf_event_attr` only by the perf driver.

use std::fs;
use std::io;
use std::path::Path;

use perf_event_open_sys::bindings as sys;

/// Hardware event ids (`PERF_TYPE_HARDWARE`).
pub mod hw {
    use super::sys;

    pub const CPU_CYCLES: u64 = sys::PERF_COUNT_HW_CPU_CYCLES as u64;
    pub const INSTRUCTIONS: u64 = sys::PERF_COUNT_HW_INSTRUCTIONS as u64;
    pub const CACHE_MISSES: u64 = sys::PERF_COUNT_HW_CACHE_MISSES as u64;
    pub const BRANCH_MISSES: u64 = sys::PERF_COUNT_HW_BRANCH_MISSES as u64;
}

/// Software event ids (`PERF_TYPE_SOFTWARE`).
pub mod sw {
    use super::sys;

    pub const CPU_CLOCK: u64 = sys::PERF_COUNT_SW_CPU_CLOCK as u64;
    pub const TASK_CLOCK: u64 = sys::PERF_COUNT_SW_TASK_CLOCK as u64;
    pub const CONTEXT_SWITCHES: u64 = sys::PERF_COUNT_SW_CONTEXT_SWITCHES as u64;
    pub const DUMMY: u64 = sys::PERF_COUNT_SW_DUMMY as u64;
}

/// `sample_type` bits. Fields appear in a sample record in this order.
pub mod sample {
    use super::sys;

    pub const IP: u64 = sys::PERF_SAMPLE_IP as u64;
    pub const TID: u64 = sys::PERF_SAMPLE_TID as u64;
    pub const TIME: u64 = sys::PERF_SAMPLE_TIME as u64;
    pub const ADDR: u64 = sys::PERF_SAMPLE_ADDR as u64;
    pub const ID: u64 = sys::PERF_SAMPLE_ID as u64;
    pub const STREAM_ID: u64 = sys::PERF_SAMPLE_STREAM_ID as u64;
    pub const CPU: u64 = sys::PERF_SAMPLE_CPU as u64;
    pub const PERIOD: u64 = sys::PERF_SAMPLE_PERIOD as u64;
    pub const CALLCHAIN: u64 = sys::PERF_SAMPLE_CALLCHAIN as u64;
    pub const RAW: u64 = sys::PERF_SAMPLE_RAW as u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Hardware,
    Software,
    Tracepoint,
    Raw,
}

impl EventType {
    #[must_use]
    pub fn as_raw(self) -> u32 {
        match self {
            EventType::Hardware => sys::PERF_TYPE_HARDWARE,
            EventType::Software => sys::PERF_TYPE_SOFTWARE,
            EventType::Tracepoint => sys::PERF_TYPE_TRACEPOINT,
            EventType::Raw => sys::PERF_TYPE_RAW,
        }
    }
}

/// When the kernel writes a sample record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleOn {
    /// Counting only.
    #[default]
    Never,
    /// Average samples per second.
    Freq(u64),
    /// One sample every N events.
    Period(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EventAttr {
    pub name: String,
    pub kind: EventType,
    pub config: u64,
    pub sample: SampleOn,
    pub sample_type: u64,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub exclude_guest: bool,
    pub exclude_host: bool,
    /// Emit COMM records.
    pub comm: bool,
    /// Emit FORK/EXIT records.
    pub task: bool,
    /// Emit SWITCH / SWITCH_CPU_WIDE records.
    pub context_switch: bool,
    pub sample_id_all: bool,
    /// Wake the reader after this many records; 0 keeps the kernel default.
    pub wakeup_events: u32,
}

impl EventAttr {
    pub fn new(name: impl Into<String>, kind: EventType, config: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            sample: SampleOn::Never,
            sample_type: 0,
            exclude_user: false,
            exclude_kernel: false,
            exclude_guest: false,
            exclude_host: false,
            comm: false,
            task: false,
            context_switch: false,
            sample_id_all: false,
            wakeup_events: 0,
        }
    }

    pub fn hardware(name: impl Into<String>, id: u64) -> Self {
        Self::new(name, EventType::Hardware, id)
    }

    pub fn software(name: impl Into<String>, id: u64) -> Self {
        Self::new(name, EventType::Software, id)
    }

    /// Tracepoint `sys:name` with its tracefs `id`.
    pub fn tracepoint(selector: impl Into<String>, id: u64) -> Self {
        Self::new(selector, EventType::Tracepoint, id)
    }

    #[must_use]
    pub fn sample_on(self, sample: SampleOn) -> Self {
        Self { sample, ..self }
    }

    #[must_use]
    pub fn with_sample_type(self, bits: u64) -> Self {
        Self { sample_type: self.sample_type | bits, ..self }
    }

    #[must_use]
    pub fn exclude(self, user: bool, kernel: bool, guest: bool) -> Self {
        Self { exclude_user: user, exclude_kernel: kernel, exclude_guest: guest, ..self }
    }

    /// Request COMM, FORK/EXIT and context switch side-band records.
    #[must_use]
    pub fn side_band(self, comm: bool, task: bool, context_switch: bool) -> Self {
        Self { comm, task, context_switch, sample_id_all: true, ..self }
    }

    #[must_use]
    pub fn wakeup(self, events: u32) -> Self {
        Self { wakeup_events: events, ..self }
    }
}

/// Split a `sys:name` tracepoint selector.
///
/// # Errors
/// Returns `InvalidInput` when either half is missing.
pub fn split_tracepoint(selector: &str) -> io::Result<(&str, &str)> {
    match selector.split_once(':') {
        Some((system, name)) if !system.is_empty() && !name.is_empty() => Ok((system, name)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tracepoint {selector:?} is not of the form sys:name"),
        )),
    }
}

/// Read a tracepoint id from `<tracefs>/events/<system>/<name>/id`.
///
/// # Errors
/// Returns an error if the id file is missing or does not hold a number.
pub fn tracepoint_id(tracefs: &Path, system: &str, name: &str) -> io::Result<u64> {
    let path = tracefs.join("events").join(system).join(name).join("id");
    let content = fs::read_to_string(&path)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
    content
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_sample_type() {
        let attr = EventAttr::software("cpu-clock", sw::CPU_CLOCK)
            .sample_on(SampleOn::Freq(99))
            .with_sample_type(sample::IP)
            .with_sample_type(sample::TID);
        assert_eq!(attr.sample_type, sample::IP | sample::TID);
        assert_eq!(attr.sample, SampleOn::Freq(99));
    }

    #[test]
    fn test_counting_event_never_samples() {
        let attr = EventAttr::hardware("cycles", hw::CPU_CYCLES).exclude(true, false, true);
        assert!(attr.exclude_user && attr.exclude_guest && !attr.exclude_kernel);
        assert_eq!(attr.sample, SampleOn::Never);
    }

    #[test]
    fn test_tracepoint_id_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("events/sched/sched_switch");
        fs::create_dir_all(&tp).unwrap();
        fs::write(tp.join("id"), "316\n").unwrap();
        assert_eq!(tracepoint_id(dir.path(), "sched", "sched_switch").unwrap(), 316);
        assert!(tracepoint_id(dir.path(), "sched", "nope").is_err());
    }

    #[test]
    fn test_tracepoint_selector_must_have_system() {
        assert_eq!(split_tracepoint("sched:sched_switch").unwrap(), ("sched", "sched_switch"));
        let err = split_tracepoint("sched_switch").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(split_tracepoint("sched:").is_err());
    }
}
