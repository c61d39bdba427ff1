//! Read-only monitor configuration
//!
//! Populated once from the command line and handed to every plugin callback
//! that needs it. It survives reinitialization unchanged.

use std::time::Duration;

/// Default trigger threshold (`-T`).
pub const DEFAULT_TRIGGER: u64 = 1000;
/// Default interrupt-off latency in microseconds (`-L`).
pub const DEFAULT_LATENCY_US: u64 = 20_000;
/// Default sampling frequency in Hz (`-F`).
pub const DEFAULT_FREQ: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    /// Trigger threshold, 0 disables triggering.
    pub trigger: u64,
    /// Monitor the guest instead of the host.
    pub guest: bool,
    /// CPU list such as `1-3,8`; `None` means all online CPUs.
    pub cpus: Option<String>,
    /// Poll interval; `None` disables interval callbacks and counter reads.
    pub interval: Option<Duration>,
    /// Comma separated process/thread ids to attach to.
    pub pids: Option<String>,
    /// Self-test mode for monitors that support it.
    pub test: bool,
    /// Latency threshold in microseconds.
    pub latency_us: u64,
    /// Sampling frequency in Hz, 0 disables sampling.
    pub freq: u64,
    /// Event selector(s), comma separated.
    pub event: Option<String>,
    /// Event filter expression or comm filter.
    pub filter: Option<String>,
    pub interruptible: bool,
    pub uninterruptible: bool,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub exclude_guest: bool,
    /// Threshold comparator: report only values greater than this.
    pub greater_than: u64,
    /// Allocation tracepoint/kprobe.
    pub tp_alloc: Option<String>,
    /// Free tracepoint/kprobe.
    pub tp_free: Option<String>,
    pub syscalls: bool,
    /// Print per-instance statistics instead of totals.
    pub perins: bool,
    pub callchain: bool,
    /// Ring buffer pages; 0 keeps the monitor's own choice.
    pub mmap_pages: usize,
    /// Request precise (skid-free) samples.
    pub precise: bool,
    pub verbose: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER,
            guest: false,
            cpus: None,
            interval: None,
            pids: None,
            test: false,
            latency_us: DEFAULT_LATENCY_US,
            freq: DEFAULT_FREQ,
            event: None,
            filter: None,
            interruptible: false,
            uninterruptible: false,
            exclude_user: false,
            exclude_kernel: false,
            exclude_guest: false,
            greater_than: 0,
            tp_alloc: None,
            tp_free: None,
            syscalls: false,
            perins: false,
            callchain: false,
            mmap_pages: 0,
            precise: false,
            verbose: 0,
        }
    }
}

impl Config {
    /// Comma separated event selectors with surrounding blanks removed.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.event.as_deref().unwrap_or("").split(',').map(str::trim).filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.trigger, 1000);
        assert_eq!(config.latency_us, 20_000);
        assert_eq!(config.freq, 100);
        assert_eq!(config.interval, None);
    }

    #[test]
    fn test_event_list_split() {
        let config = Config {
            event: Some("sched:sched_switch, irq:irq_handler_entry,".to_string()),
            ..Config::default()
        };
        let events: Vec<_> = config.events().collect();
        assert_eq!(events, vec!["sched:sched_switch", "irq:irq_handler_entry"]);
    }
}
