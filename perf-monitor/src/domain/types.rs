//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep CPU ids, thread ids and instance indexes apart
//! in function signatures; all three are small integers and easy to mix up.

use std::fmt;

/// CPU ID
///
/// Represents a logical CPU as numbered by the kernel (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU #{}", self.0)
    }
}

/// Thread ID
///
/// A kernel task id. A process id is the tid of its main thread, so process
/// lists and thread lists share this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread #{}", self.0)
    }
}

/// Handle to a single opened counter, allocated by an
/// [`EventDriver`](crate::events::EventDriver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterId(pub usize);

/// Index of a declared event inside an [`EventList`](crate::events::EventList).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);
