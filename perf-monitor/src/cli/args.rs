//! CLI argument definitions

use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::config::{Config, DEFAULT_FREQ, DEFAULT_LATENCY_US, DEFAULT_TRIGGER};

#[derive(Parser, Debug)]
#[command(
    name = "perf-monitor",
    version,
    about = "Run a perf event monitor on CPUs or threads",
    after_help = "\
EXAMPLES:
    perf-monitor -l                                  List monitors
    sudo perf-monitor stat -e cycles -i 1000 --perins  Cycle deltas per CPU every second
    sudo perf-monitor task-watch -C 0-3              Fork/exit side-band on CPUs 0-3
    sudo perf-monitor trace -e sched:sched_wakeup -i 1000 -p 1234"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Args {
    /// Monitor to run
    #[arg(value_name = "MONITOR", required_unless_present = "list")]
    pub monitor: Option<String>,

    /// List registered monitors and exit
    #[arg(short, long)]
    pub list: bool,

    /// Trigger threshold, 0 disables triggering
    #[arg(short = 'T', long, default_value_t = DEFAULT_TRIGGER)]
    pub trigger: u64,

    /// CPUs to monitor, e.g. 0-3,8 (default: all online)
    #[arg(short = 'C', long = "cpu", value_name = "CPUS")]
    pub cpus: Option<String>,

    /// Monitor the guest
    #[arg(short = 'G', long)]
    pub guest: bool,

    /// Interval in milliseconds, 0 disables interval callbacks
    #[arg(short, long, value_name = "MS", default_value_t = 0)]
    pub interval: u64,

    /// Comma separated process/thread ids to attach to
    #[arg(short, long, value_name = "PIDS")]
    pub pids: Option<String>,

    /// Self-test mode
    #[arg(long)]
    pub test: bool,

    /// Latency threshold in microseconds
    #[arg(short = 'L', long, value_name = "US", default_value_t = DEFAULT_LATENCY_US)]
    pub latency: u64,

    /// Sampling frequency in Hz
    #[arg(short = 'F', long, value_name = "HZ", default_value_t = DEFAULT_FREQ)]
    pub freq: u64,

    /// Event selector(s), comma separated
    #[arg(short, long, value_name = "EVENTS")]
    pub event: Option<String>,

    /// Event filter expression
    #[arg(long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Task state: interruptible
    #[arg(short = 'S', long)]
    pub interruptible: bool,

    /// Task state: uninterruptible
    #[arg(short = 'D', long)]
    pub uninterruptible: bool,

    /// Exclude user space
    #[arg(long)]
    pub exclude_user: bool,

    /// Exclude kernel space
    #[arg(long)]
    pub exclude_kernel: bool,

    /// Exclude guest
    #[arg(long)]
    pub exclude_guest: bool,

    /// Report only values greater than this
    #[arg(long = "than", value_name = "N", default_value_t = 0)]
    pub greater_than: u64,

    /// Allocation tracepoint
    #[arg(long = "alloc", value_name = "EVENT")]
    pub tp_alloc: Option<String>,

    /// Free tracepoint
    #[arg(long = "free", value_name = "EVENT")]
    pub tp_free: Option<String>,

    /// Trace syscalls
    #[arg(long)]
    pub syscalls: bool,

    /// Print per-instance statistics
    #[arg(long)]
    pub perins: bool,

    /// Enable call-graph recording
    #[arg(short = 'g', long = "call-graph")]
    pub callchain: bool,

    /// Ring buffer pages per instance (default: the monitor's own choice)
    #[arg(short, long = "mmap-pages", value_name = "PAGES", default_value_t = 0)]
    pub mmap_pages: usize,

    /// Request precise samples
    #[arg(long)]
    pub precise: bool,

    /// Increase verbosity (-v info, -vv debug and side-band lines, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Default log filter for the `-v` count; `RUST_LOG` overrides it.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            trigger: args.trigger,
            guest: args.guest,
            cpus: args.cpus,
            interval: (args.interval > 0).then(|| Duration::from_millis(args.interval)),
            pids: args.pids,
            test: args.test,
            // values of 0 or 1 are treated as unset
            latency_us: if args.latency > 1 { args.latency } else { DEFAULT_LATENCY_US },
            freq: args.freq,
            event: args.event,
            filter: args.filter,
            interruptible: args.interruptible,
            uninterruptible: args.uninterruptible,
            exclude_user: args.exclude_user,
            exclude_kernel: args.exclude_kernel,
            exclude_guest: args.exclude_guest,
            greater_than: args.greater_than,
            tp_alloc: args.tp_alloc,
            tp_free: args.tp_free,
            syscalls: args.syscalls,
            perins: args.perins,
            callchain: args.callchain,
            mmap_pages: args.mmap_pages,
            precise: args.precise,
            verbose: args.verbose,
        }
    }
}
