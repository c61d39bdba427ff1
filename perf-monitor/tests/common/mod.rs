//! In-memory host for driving the engine without a kernel.
//!
//! `FakeHost` hands out `FakeDriver`s that record every operation in a
//! shared log, serve queued records through `FakeRing`s and can be told to
//! fail individual steps.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use perf_monitor::domain::{CounterId, CpuId, MonitorError, Tid};
use perf_monitor::events::{
    CounterValue, EventAttr, EventDriver, PollOutcome, RawRecord, RingBuffer, HEADER_SIZE,
};
use perf_monitor::host::Host;
use perf_monitor::record;

pub type Log = Rc<RefCell<Vec<String>>>;

#[derive(Default)]
pub struct State {
    pub online: Vec<u32>,
    pub threads: Vec<u32>,
    /// Records waiting in the ring of each instance.
    pub pending: HashMap<usize, VecDeque<Vec<u8>>>,
    /// Fail the open call with this index (0-based, per driver).
    pub fail_open_at: Option<usize>,
    pub fail_enable: bool,
    pub fail_filter: bool,
    /// Fail the mmap call with this index (0-based, per driver).
    pub fail_mmap_at: Option<usize>,
    /// Tracepoint ids by `sys:name`.
    pub tracepoints: HashMap<String, u64>,
    /// Counters (by open order) whose reads fail.
    pub unreadable: Vec<usize>,
    /// Instances whose ring reports a hangup on the next poll.
    pub hangups: Vec<usize>,
    /// Replace the online CPU set at the given poll.
    pub offline_at_poll: Option<(usize, Vec<u32>)>,
    /// Set the stop flag once this many polls happened in total.
    pub stop_after_polls: Option<usize>,
    pub polls: usize,
    /// Number of descriptors passed to each poll.
    pub polled: Vec<usize>,
    pub drivers: usize,
    /// (cpu, thread) of every successful open.
    pub opened: Vec<(Option<u32>, Option<u32>)>,
}

pub struct FakeHost {
    pub state: Rc<RefCell<State>>,
    pub log: Log,
    pub stop: Rc<AtomicBool>,
    pub usr1: AtomicBool,
}

impl FakeHost {
    pub fn with_cpus(online: &[u32]) -> Self {
        let state = State { online: online.to_vec(), ..State::default() };
        Self {
            state: Rc::new(RefCell::new(state)),
            log: Log::default(),
            stop: Rc::new(AtomicBool::new(false)),
            usr1: AtomicBool::new(false),
        }
    }

    pub fn stop_after(self, polls: usize) -> Self {
        self.state.borrow_mut().stop_after_polls = Some(polls);
        self
    }

    pub fn push_record(&self, instance: usize, bytes: Vec<u8>) {
        self.state.borrow_mut().pending.entry(instance).or_default().push_back(bytes);
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.values().map(VecDeque::len).sum()
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Position of the first log entry starting with `prefix`.
    pub fn first(&self, prefix: &str) -> Option<usize> {
        self.log.borrow().iter().position(|e| e.starts_with(prefix))
    }

    /// Position of the last log entry starting with `prefix`.
    pub fn last(&self, prefix: &str) -> Option<usize> {
        self.log.borrow().iter().rposition(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.borrow().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl Host for FakeHost {
    fn online_cpus(&self) -> Result<Vec<CpuId>, MonitorError> {
        Ok(self.state.borrow().online.iter().copied().map(CpuId).collect())
    }

    fn resolve_thread(&self, tid: Tid) -> Result<(), MonitorError> {
        if self.state.borrow().threads.contains(&tid.0) {
            Ok(())
        } else {
            Err(MonitorError::ThreadNotFound(tid))
        }
    }

    fn new_driver(&self) -> Box<dyn EventDriver> {
        self.state.borrow_mut().drivers += 1;
        self.log.borrow_mut().push("driver".to_string());
        Box::new(FakeDriver {
            state: Rc::clone(&self.state),
            log: Rc::clone(&self.log),
            stop: Rc::clone(&self.stop),
            opens: 0,
            maps: 0,
            reads: HashMap::new(),
            rings: Vec::new(),
        })
    }
}

pub struct FakeDriver {
    state: Rc<RefCell<State>>,
    log: Log,
    stop: Rc<AtomicBool>,
    opens: usize,
    maps: usize,
    reads: HashMap<usize, u64>,
    /// (leader, instance) of every mapped ring.
    rings: Vec<(CounterId, usize)>,
}

impl FakeDriver {
    fn note(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl EventDriver for FakeDriver {
    fn open(
        &mut self,
        attr: &EventAttr,
        cpu: Option<CpuId>,
        thread: Option<Tid>,
    ) -> io::Result<CounterId> {
        let idx = self.opens;
        self.opens += 1;
        if self.state.borrow().fail_open_at == Some(idx) {
            self.note(format!("open-failed c{idx}"));
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        self.state.borrow_mut().opened.push((cpu.map(|c| c.0), thread.map(|t| t.0)));
        self.note(format!("open c{idx} {}", attr.name));
        Ok(CounterId(idx))
    }

    fn close(&mut self, id: CounterId) {
        self.note(format!("close c{}", id.0));
    }

    fn enable(&mut self, id: CounterId) -> io::Result<()> {
        if self.state.borrow().fail_enable {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.note(format!("enable c{}", id.0));
        Ok(())
    }

    fn disable(&mut self, id: CounterId) -> io::Result<()> {
        self.note(format!("disable c{}", id.0));
        Ok(())
    }

    fn set_filter(&mut self, id: CounterId, filter: &str) -> io::Result<()> {
        if self.state.borrow().fail_filter {
            self.note(format!("filter-failed c{}", id.0));
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.note(format!("filter c{} {filter}", id.0));
        Ok(())
    }

    fn read(&mut self, id: CounterId) -> io::Result<CounterValue> {
        if self.state.borrow().unreadable.contains(&id.0) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        let value = self.reads.entry(id.0).or_insert(0);
        *value += 100;
        Ok(CounterValue { value: *value, enabled: 1, running: 1 })
    }

    fn mmap(&mut self, id: CounterId, pages: usize) -> io::Result<Box<dyn RingBuffer>> {
        let idx = self.maps;
        self.maps += 1;
        if self.state.borrow().fail_mmap_at == Some(idx) {
            self.note(format!("mmap-failed c{}", id.0));
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        let instance = self.rings.len();
        self.rings.push((id, instance));
        self.note(format!("mmap c{} {pages}", id.0));
        Ok(Box::new(FakeRing {
            state: Rc::clone(&self.state),
            log: Rc::clone(&self.log),
            instance,
            snapshot: VecDeque::new(),
            current: None,
        }))
    }

    fn set_output(&mut self, id: CounterId, target: CounterId) -> io::Result<()> {
        self.note(format!("set_output c{} c{}", id.0, target.0));
        Ok(())
    }

    fn poll(&mut self, ids: &[CounterId], timeout: Option<Duration>) -> io::Result<PollOutcome> {
        let mut st = self.state.borrow_mut();
        st.polls += 1;
        st.polled.push(ids.len());

        let mut outcome = PollOutcome::default();
        for (leader, instance) in &self.rings {
            if !ids.contains(leader) {
                continue;
            }
            if st.hangups.contains(instance) {
                outcome.hangups.push(*leader);
            } else if st.pending.get(instance).is_some_and(|q| !q.is_empty()) {
                outcome.ready += 1;
            }
        }
        st.hangups.clear();
        if let Some((at, online)) = st.offline_at_poll.clone() {
            if at == st.polls {
                st.online = online;
            }
        }
        if st.stop_after_polls.is_some_and(|n| st.polls >= n) {
            self.stop.store(true, Ordering::SeqCst);
        }
        drop(st);

        if outcome.ready == 0 {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
        }
        Ok(outcome)
    }

    fn tracepoint_id(&self, system: &str, name: &str) -> io::Result<u64> {
        self.state
            .borrow()
            .tracepoints
            .get(&format!("{system}:{name}"))
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl Drop for FakeDriver {
    fn drop(&mut self) {
        self.note("driver-dropped".to_string());
    }
}

pub struct FakeRing {
    state: Rc<RefCell<State>>,
    log: Log,
    instance: usize,
    snapshot: VecDeque<Vec<u8>>,
    current: Option<Vec<u8>>,
}

impl RingBuffer for FakeRing {
    fn read_init(&mut self) -> bool {
        if let Some(queue) = self.state.borrow_mut().pending.get_mut(&self.instance) {
            self.snapshot.extend(queue.drain(..));
        }
        !self.snapshot.is_empty()
    }

    fn read_event(&mut self) -> Option<RawRecord<'_>> {
        self.current = self.snapshot.pop_front();
        let bytes = self.current.as_deref()?;
        let kind = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let misc = u16::from_ne_bytes(bytes[4..6].try_into().unwrap());
        Some(RawRecord { kind, misc, bytes })
    }

    fn consume(&mut self) {
        self.current = None;
    }

    fn read_done(&mut self) {}
}

impl Drop for FakeRing {
    fn drop(&mut self) {
        self.log.borrow_mut().push(format!("unmap {}", self.instance));
    }
}

/// Report sink shared between the engine and the test.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Raw record bytes: header followed by `body`.
pub fn raw_record(kind: u32, misc: u16, body: &[u8]) -> Vec<u8> {
    let size = u16::try_from(HEADER_SIZE + body.len()).unwrap();
    let mut bytes = Vec::with_capacity(usize::from(size));
    bytes.extend_from_slice(&kind.to_ne_bytes());
    bytes.extend_from_slice(&misc.to_ne_bytes());
    bytes.extend_from_slice(&size.to_ne_bytes());
    bytes.extend_from_slice(body);
    bytes
}

pub fn lost(lost: u64) -> Vec<u8> {
    let mut body = 1u64.to_ne_bytes().to_vec();
    body.extend_from_slice(&lost.to_ne_bytes());
    raw_record(record::LOST, 0, &body)
}

pub fn task(kind: u32, pid: u32, tid: u32) -> Vec<u8> {
    let mut body = Vec::new();
    for field in [pid, 1, tid, 1] {
        body.extend_from_slice(&field.to_ne_bytes());
    }
    body.extend_from_slice(&0u64.to_ne_bytes());
    raw_record(kind, 0, &body)
}

pub fn fork(pid: u32, tid: u32) -> Vec<u8> {
    task(record::FORK, pid, tid)
}

pub fn comm(pid: u32, name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&pid.to_ne_bytes());
    body.extend_from_slice(&pid.to_ne_bytes());
    body.extend_from_slice(name.as_bytes());
    body.resize(body.len().next_multiple_of(8), 0);
    raw_record(record::COMM, 0, &body)
}

pub fn sample(body: &[u8]) -> Vec<u8> {
    raw_record(record::SAMPLE, 0, body)
}

/// Tracepoint hit laid out for `TID | TIME | CPU | PERIOD | RAW`, raw data
/// starting with `common_type`.
pub fn tracepoint_hit(pid: u32, cpu: u32, time: u64, common_type: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&pid.to_ne_bytes());
    body.extend_from_slice(&pid.to_ne_bytes());
    body.extend_from_slice(&time.to_ne_bytes());
    body.extend_from_slice(&cpu.to_ne_bytes());
    body.extend_from_slice(&0u32.to_ne_bytes());
    body.extend_from_slice(&1u64.to_ne_bytes());
    body.extend_from_slice(&4u32.to_ne_bytes());
    body.extend_from_slice(&common_type.to_ne_bytes());
    body.extend_from_slice(&[0, 0]);
    sample(&body)
}
