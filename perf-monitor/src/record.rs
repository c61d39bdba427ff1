//! # Ring-buffer records
//!
//! Decodes the raw bytes of a ring-buffer record into a closed set of record
//! kinds. Layouts follow `include/uapi/linux/perf_event.h` without the
//! optional `sample_id_all` trailer, which decoding ignores.
//!
//! Sample records are kept as bytes: their layout depends on the
//! `sample_type` the plugin asked for, and [`SampleReader`] decodes them.

use perf_event_open_sys::bindings as sys;

use crate::domain::MonitorError;
use crate::events::{sample, RawRecord, HEADER_SIZE};

pub const LOST: u32 = sys::PERF_RECORD_LOST;
pub const COMM: u32 = sys::PERF_RECORD_COMM;
pub const EXIT: u32 = sys::PERF_RECORD_EXIT;
pub const THROTTLE: u32 = sys::PERF_RECORD_THROTTLE;
pub const UNTHROTTLE: u32 = sys::PERF_RECORD_UNTHROTTLE;
pub const FORK: u32 = sys::PERF_RECORD_FORK;
pub const SAMPLE: u32 = sys::PERF_RECORD_SAMPLE;
pub const SWITCH: u32 = sys::PERF_RECORD_SWITCH;
pub const SWITCH_CPU_WIDE: u32 = sys::PERF_RECORD_SWITCH_CPU_WIDE;

/// `misc` bit: the switch record describes a task leaving the CPU.
#[allow(clippy::cast_possible_truncation)]
pub const MISC_SWITCH_OUT: u16 = sys::PERF_RECORD_MISC_SWITCH_OUT as u16;
/// `misc` bit: the comm change comes from exec().
#[allow(clippy::cast_possible_truncation)]
pub const MISC_COMM_EXEC: u16 = sys::PERF_RECORD_MISC_COMM_EXEC as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostRecord {
    pub id: u64,
    pub lost: u64,
}

/// FORK and EXIT share one layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub pid: u32,
    pub ppid: u32,
    pub tid: u32,
    pub ptid: u32,
    pub time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommRecord<'a> {
    pub pid: u32,
    pub tid: u32,
    pub comm: &'a str,
    pub exec: bool,
}

/// THROTTLE and UNTHROTTLE share one layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub time: u64,
    pub id: u64,
    pub stream_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord<'a> {
    pub misc: u16,
    /// Body after the record header.
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRecord {
    pub out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCpuWideRecord {
    pub next_prev_pid: u32,
    pub next_prev_tid: u32,
    pub out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Lost(LostRecord),
    Fork(TaskRecord),
    Exit(TaskRecord),
    Comm(CommRecord<'a>),
    Throttle(ThrottleRecord),
    Unthrottle(ThrottleRecord),
    Sample(SampleRecord<'a>),
    Switch(SwitchRecord),
    SwitchCpuWide(SwitchCpuWideRecord),
}

/// Little cursor over native-endian record fields.
struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let out = self.bytes.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(out)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).and_then(|b| b.try_into().ok()).map(u32::from_ne_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).and_then(|b| b.try_into().ok()).map(u64::from_ne_bytes)
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos.min(self.bytes.len())..];
        self.pos = self.bytes.len();
        out
    }
}

/// Classify and decode one raw record.
///
/// # Errors
/// Returns [`MonitorError::UnknownRecord`] for kinds outside the supported
/// set and [`MonitorError::TruncatedRecord`] when the body is too short.
pub fn decode(raw: RawRecord<'_>) -> Result<Record<'_>, MonitorError> {
    let truncated = || MonitorError::TruncatedRecord { kind: raw.kind, len: raw.bytes.len() };
    let mut f = Fields::new(raw.bytes.get(HEADER_SIZE..).ok_or_else(truncated)?);
    let out = raw.misc & MISC_SWITCH_OUT != 0;

    let record = match raw.kind {
        LOST => Record::Lost(LostRecord {
            id: f.u64().ok_or_else(truncated)?,
            lost: f.u64().ok_or_else(truncated)?,
        }),
        FORK | EXIT => {
            let task = TaskRecord {
                pid: f.u32().ok_or_else(truncated)?,
                ppid: f.u32().ok_or_else(truncated)?,
                tid: f.u32().ok_or_else(truncated)?,
                ptid: f.u32().ok_or_else(truncated)?,
                time: f.u64().ok_or_else(truncated)?,
            };
            if raw.kind == FORK {
                Record::Fork(task)
            } else {
                Record::Exit(task)
            }
        }
        COMM => {
            let pid = f.u32().ok_or_else(truncated)?;
            let tid = f.u32().ok_or_else(truncated)?;
            let name = f.rest();
            let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
            Record::Comm(CommRecord {
                pid,
                tid,
                comm: std::str::from_utf8(&name[..end]).unwrap_or("<invalid>"),
                exec: raw.misc & MISC_COMM_EXEC != 0,
            })
        }
        THROTTLE | UNTHROTTLE => {
            let throttle = ThrottleRecord {
                time: f.u64().ok_or_else(truncated)?,
                id: f.u64().ok_or_else(truncated)?,
                stream_id: f.u64().ok_or_else(truncated)?,
            };
            if raw.kind == THROTTLE {
                Record::Throttle(throttle)
            } else {
                Record::Unthrottle(throttle)
            }
        }
        SAMPLE => Record::Sample(SampleRecord { misc: raw.misc, body: f.rest() }),
        SWITCH => Record::Switch(SwitchRecord { out }),
        SWITCH_CPU_WIDE => Record::SwitchCpuWide(SwitchCpuWideRecord {
            next_prev_pid: f.u32().ok_or_else(truncated)?,
            next_prev_tid: f.u32().ok_or_else(truncated)?,
            out,
        }),
        other => return Err(MonitorError::UnknownRecord(other)),
    };
    Ok(record)
}

/// Fields of a sample record, as far as `sample_type` enabled them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample<'a> {
    pub ip: Option<u64>,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub time: Option<u64>,
    pub addr: Option<u64>,
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
    pub period: Option<u64>,
    pub callchain: Vec<u64>,
    pub raw: &'a [u8],
}

/// Decodes sample bodies for one `sample_type`.
#[derive(Debug, Clone, Copy)]
pub struct SampleReader {
    sample_type: u64,
}

impl SampleReader {
    #[must_use]
    pub fn new(sample_type: u64) -> Self {
        Self { sample_type }
    }

    fn has(&self, bit: u64) -> bool {
        self.sample_type & bit != 0
    }

    /// Decode `record`. Returns `None` when the body is shorter than the
    /// enabled fields require.
    #[must_use]
    pub fn read<'a>(&self, record: &SampleRecord<'a>) -> Option<Sample<'a>> {
        let mut f = Fields::new(record.body);
        let mut s = Sample::default();

        if self.has(sample::IP) {
            s.ip = Some(f.u64()?);
        }
        if self.has(sample::TID) {
            s.pid = Some(f.u32()?);
            s.tid = Some(f.u32()?);
        }
        if self.has(sample::TIME) {
            s.time = Some(f.u64()?);
        }
        if self.has(sample::ADDR) {
            s.addr = Some(f.u64()?);
        }
        if self.has(sample::ID) {
            s.id = Some(f.u64()?);
        }
        if self.has(sample::STREAM_ID) {
            s.stream_id = Some(f.u64()?);
        }
        if self.has(sample::CPU) {
            s.cpu = Some(f.u32()?);
            f.u32()?; // reserved
        }
        if self.has(sample::PERIOD) {
            s.period = Some(f.u64()?);
        }
        if self.has(sample::CALLCHAIN) {
            let nr = usize::try_from(f.u64()?).ok()?;
            s.callchain.reserve(nr.min(512));
            for _ in 0..nr {
                s.callchain.push(f.u64()?);
            }
        }
        if self.has(sample::RAW) {
            let size = usize::try_from(f.u32()?).ok()?;
            s.raw = f.take(size)?;
        }
        Some(s)
    }
}
