//! Event sources
//!
//! - `attr`: plugin-facing event declarations
//! - `list`: the event-list aggregate bound to the active targets
//! - `perf`: `perf_event_open(2)` driver
//! - `ring`: memory-mapped record ring buffers
//!
//! The engine talks to the kernel only through [`EventDriver`] and
//! [`RingBuffer`].

pub mod attr;
pub mod list;
pub mod perf;
pub mod ring;

use std::io;
use std::time::Duration;

use crate::domain::{CounterId, CpuId, Tid};

pub use attr::{hw, sample, sw, EventAttr, EventType, SampleOn};
pub use list::{EventList, Evsel};
pub use perf::PerfDriver;
pub use ring::MmapRing;

/// One counter reading (`perf_counts_values`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValue {
    pub value: u64,
    /// Nanoseconds the event was enabled.
    pub enabled: u64,
    /// Nanoseconds the event was actually counting (less when multiplexed).
    pub running: u64,
}

impl CounterValue {
    /// Value extrapolated over the whole enabled time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn scaled(&self) -> u64 {
        if self.running == 0 || self.running >= self.enabled {
            self.value
        } else {
            (self.value as f64 * self.enabled as f64 / self.running as f64) as u64
        }
    }
}

/// Result of one readiness wait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Descriptors with data to read.
    pub ready: usize,
    /// Descriptors whose target went away; they must not be polled again.
    pub hangups: Vec<CounterId>,
}

/// One record as found in a ring buffer, header included.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub kind: u32,
    pub misc: u16,
    pub bytes: &'a [u8],
}

/// Size of `struct perf_event_header`.
pub const HEADER_SIZE: usize = 8;

/// Read side of a per-instance record ring.
///
/// A drain is `read_init`, then `read_event`/`consume` pairs until
/// `read_event` returns `None`, then `read_done`.
pub trait RingBuffer {
    /// Snapshot the producer position. Returns `false` when there is nothing
    /// to read; the caller then skips `read_done`.
    fn read_init(&mut self) -> bool;

    /// Next record in the snapshot, or `None` once it is exhausted.
    fn read_event(&mut self) -> Option<RawRecord<'_>>;

    /// Hand the space of every record returned so far back to the producer.
    fn consume(&mut self);

    /// Close the read epoch.
    fn read_done(&mut self);
}

/// Kernel-facing operations on individual counters.
pub trait EventDriver {
    /// Open `attr` disabled on `cpu`/`thread` (`None` is "any").
    ///
    /// # Errors
    /// Returns the OS error of the open call.
    fn open(&mut self, attr: &EventAttr, cpu: Option<CpuId>, thread: Option<Tid>)
        -> io::Result<CounterId>;

    fn close(&mut self, id: CounterId);

    /// # Errors
    /// Returns the OS error of the enable ioctl.
    fn enable(&mut self, id: CounterId) -> io::Result<()>;

    /// # Errors
    /// Returns the OS error of the disable ioctl.
    fn disable(&mut self, id: CounterId) -> io::Result<()>;

    /// # Errors
    /// Returns an error if the kernel rejects the filter expression.
    fn set_filter(&mut self, id: CounterId, filter: &str) -> io::Result<()>;

    /// # Errors
    /// Returns an error if the counter cannot be read right now.
    fn read(&mut self, id: CounterId) -> io::Result<CounterValue>;

    /// Map `pages` data pages of `id`'s ring buffer.
    ///
    /// # Errors
    /// Returns the OS error of the mapping.
    fn mmap(&mut self, id: CounterId, pages: usize) -> io::Result<Box<dyn RingBuffer>>;

    /// Route `id`'s records into the ring buffer of `target`.
    ///
    /// # Errors
    /// Returns the OS error of the redirect ioctl.
    fn set_output(&mut self, id: CounterId, target: CounterId) -> io::Result<()>;

    /// Wait until one of `ids` has data, up to `timeout` (`None` blocks).
    /// An interrupted wait reports no readiness.
    ///
    /// # Errors
    /// Returns an error if the wait itself fails.
    fn poll(&mut self, ids: &[CounterId], timeout: Option<Duration>) -> io::Result<PollOutcome>;

    /// Id of tracepoint `system:name` on this kernel.
    ///
    /// # Errors
    /// Returns an error if the tracepoint does not exist.
    fn tracepoint_id(&self, system: &str, name: &str) -> io::Result<u64>;
}
