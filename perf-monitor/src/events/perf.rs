//! # `perf_event_open(2)` driver
//!
//! Owns the counter file descriptors of one lifecycle pass. Counters are
//! opened disabled and read with total enabled/running times so multiplexed
//! values can be scaled.

#![allow(unsafe_code)] // perf_event_open, ioctl and poll are FFI calls

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd};
use std::path::Path;
use std::time::Duration;

use log::{debug, trace};
use perf_event_open_sys::{bindings as sys, ioctls, perf_event_open};

use super::attr::tracepoint_id;
use super::{CounterValue, EventAttr, EventDriver, MmapRing, PollOutcome, RingBuffer, SampleOn};
use crate::domain::{CounterId, CpuId, Tid};

const TRACEFS: &str = "/sys/kernel/tracing";
const DEBUGFS_TRACING: &str = "/sys/kernel/debug/tracing";

/// Driver backed by the running kernel.
#[derive(Default)]
pub struct PerfDriver {
    files: Vec<Option<File>>,
}

impl PerfDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn file(&self, id: CounterId) -> io::Result<&File> {
        self.files
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("counter {} closed", id.0)))
    }
}

/// Translate a declaration into the kernel ABI structure.
fn to_raw_attr(attr: &EventAttr) -> sys::perf_event_attr {
    let mut raw = sys::perf_event_attr {
        size: u32::try_from(mem::size_of::<sys::perf_event_attr>()).unwrap_or(u32::MAX),
        type_: attr.kind.as_raw(),
        config: attr.config,
        sample_type: attr.sample_type,
        read_format: u64::from(sys::PERF_FORMAT_TOTAL_TIME_ENABLED)
            | u64::from(sys::PERF_FORMAT_TOTAL_TIME_RUNNING),
        ..sys::perf_event_attr::default()
    };

    match attr.sample {
        SampleOn::Never => {}
        SampleOn::Freq(freq) => {
            raw.set_freq(1);
            raw.__bindgen_anon_1.sample_freq = freq;
        }
        SampleOn::Period(period) => raw.__bindgen_anon_1.sample_period = period,
    }
    if attr.wakeup_events > 0 {
        raw.__bindgen_anon_2.wakeup_events = attr.wakeup_events;
    }

    raw.set_disabled(1);
    raw.set_exclude_user(u64::from(attr.exclude_user));
    raw.set_exclude_kernel(u64::from(attr.exclude_kernel));
    raw.set_exclude_guest(u64::from(attr.exclude_guest));
    raw.set_exclude_host(u64::from(attr.exclude_host));
    raw.set_comm(u64::from(attr.comm));
    raw.set_task(u64::from(attr.task));
    raw.set_context_switch(u64::from(attr.context_switch));
    raw.set_sample_id_all(u64::from(attr.sample_id_all));
    raw
}

/// Map an ioctl/syscall return value to an `io::Result`.
fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl EventDriver for PerfDriver {
    fn open(
        &mut self,
        attr: &EventAttr,
        cpu: Option<CpuId>,
        thread: Option<Tid>,
    ) -> io::Result<CounterId> {
        let mut raw = to_raw_attr(attr);
        let pid = thread.map_or(-1, |t| libc::pid_t::try_from(t.0).unwrap_or(-1));
        let cpu = cpu.map_or(-1, |c| libc::c_int::try_from(c.0).unwrap_or(-1));

        let fd = unsafe {
            perf_event_open(&mut raw, pid, cpu, -1, libc::c_ulong::from(sys::PERF_FLAG_FD_CLOEXEC))
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        trace!("perf_event_open({}, pid={pid}, cpu={cpu}) = {fd}", attr.name);

        // SAFETY: the kernel just handed us this descriptor and nothing else owns it
        let file = unsafe { File::from_raw_fd(fd) };
        self.files.push(Some(file));
        Ok(CounterId(self.files.len() - 1))
    }

    fn close(&mut self, id: CounterId) {
        if let Some(slot) = self.files.get_mut(id.0) {
            slot.take();
        }
    }

    fn enable(&mut self, id: CounterId) -> io::Result<()> {
        let fd = self.file(id)?.as_raw_fd();
        check(unsafe { ioctls::ENABLE(fd, 0) })
    }

    fn disable(&mut self, id: CounterId) -> io::Result<()> {
        let fd = self.file(id)?.as_raw_fd();
        check(unsafe { ioctls::DISABLE(fd, 0) })
    }

    fn set_filter(&mut self, id: CounterId, filter: &str) -> io::Result<()> {
        let fd = self.file(id)?.as_raw_fd();
        let filter = CString::new(filter)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        check(unsafe { ioctls::SET_FILTER(fd, filter.as_ptr().cast_mut()) })
    }

    fn read(&mut self, id: CounterId) -> io::Result<CounterValue> {
        let mut buf = [0u8; 24];
        let mut file = self.file(id)?;
        file.read_exact(&mut buf)?;
        let word = |i: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[i * 8..i * 8 + 8]);
            u64::from_ne_bytes(bytes)
        };
        Ok(CounterValue { value: word(0), enabled: word(1), running: word(2) })
    }

    fn mmap(&mut self, id: CounterId, pages: usize) -> io::Result<Box<dyn RingBuffer>> {
        let pages = pages.max(1).next_power_of_two();
        let ring = MmapRing::new(self.file(id)?, pages)?;
        debug!("mapped {pages} data pages for counter {}", id.0);
        Ok(Box::new(ring))
    }

    fn set_output(&mut self, id: CounterId, target: CounterId) -> io::Result<()> {
        let fd = self.file(id)?.as_raw_fd();
        let target = self.file(target)?.as_raw_fd();
        check(unsafe { ioctls::SET_OUTPUT(fd, target) })
    }

    fn poll(&mut self, ids: &[CounterId], timeout: Option<Duration>) -> io::Result<PollOutcome> {
        let mut fds = Vec::with_capacity(ids.len());
        for id in ids {
            fds.push(libc::pollfd { fd: self.file(*id)?.as_raw_fd(), events: libc::POLLIN, revents: 0 });
        }
        let timeout_ms = timeout.map_or(-1, |t| {
            // Round up so a sub-millisecond remainder does not spin.
            let ms = t.as_millis() + u128::from(t.subsec_nanos() % 1_000_000 != 0);
            libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
        });

        let nfds = libc::nfds_t::try_from(fds.len()).unwrap_or(libc::nfds_t::MAX);
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), nfds, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(PollOutcome::default());
            }
            return Err(err);
        }

        let mut outcome = PollOutcome::default();
        for (pfd, id) in fds.iter().zip(ids) {
            if pfd.revents & libc::POLLIN != 0 {
                outcome.ready += 1;
            }
            if pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
                outcome.hangups.push(*id);
            }
        }
        Ok(outcome)
    }
    fn tracepoint_id(&self, system: &str, name: &str) -> io::Result<u64> {
        tracepoint_id(Path::new(TRACEFS), system, name)
            .or_else(|_| tracepoint_id(Path::new(DEBUGFS_TRACING), system, name))
    }
}
