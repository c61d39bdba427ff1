//! Default diagnostic lines for records a monitor does not handle itself.
//!
//! Lost-record counts are always printed; fork, exit, comm and switch lines
//! only at verbosity 2 and above.

use chrono::Local;

use super::Ctx;
use crate::record::{CommRecord, LostRecord, SwitchCpuWideRecord, SwitchRecord, TaskRecord};

/// Verbosity at which side-band records are printed.
const SIDE_BAND_VERBOSITY: u8 = 2;

/// Local wall-clock time with microseconds.
#[must_use]
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub fn lost(ctx: &mut Ctx<'_>, record: &LostRecord, ins: usize) {
    let line = format!("lost {} events on {}", record.lost, ctx.describe(ins));
    ctx.print(&line);
}

pub fn fork_exit(ctx: &mut Ctx<'_>, record: &TaskRecord, ins: usize, exit: bool) {
    if ctx.config().verbose < SIDE_BAND_VERBOSITY {
        return;
    }
    let line = format!(
        "{} ppid {} ptid {} pid {} tid {} on {}",
        if exit { "exit" } else { "fork" },
        record.ppid,
        record.ptid,
        record.pid,
        record.tid,
        ctx.describe(ins)
    );
    ctx.print(&line);
}

pub fn comm(ctx: &mut Ctx<'_>, record: &CommRecord<'_>, ins: usize) {
    if ctx.config().verbose < SIDE_BAND_VERBOSITY {
        return;
    }
    let line =
        format!("comm pid {} tid {} {} on {}", record.pid, record.tid, record.comm, ctx.describe(ins));
    ctx.print(&line);
}

pub fn context_switch(ctx: &mut Ctx<'_>, record: &SwitchRecord, ins: usize) {
    if ctx.config().verbose < SIDE_BAND_VERBOSITY {
        return;
    }
    let line = format!("switch {} on {}", if record.out { "out" } else { "in" }, ctx.describe(ins));
    ctx.print(&line);
}

pub fn context_switch_cpu_wide(ctx: &mut Ctx<'_>, record: &SwitchCpuWideRecord, ins: usize) {
    if ctx.config().verbose < SIDE_BAND_VERBOSITY {
        return;
    }
    let line = format!(
        "switch {} pid {} tid {} on {}",
        if record.out { "next" } else { "prev" },
        record.next_prev_pid,
        record.next_prev_tid,
        ctx.describe(ins)
    );
    ctx.print(&line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::{CpuId, MonitorError, Tid};
    use crate::events::EventDriver;
    use crate::host::Host;
    use crate::targets::Targets;

    struct NoHost;

    impl Host for NoHost {
        fn online_cpus(&self) -> Result<Vec<CpuId>, MonitorError> {
            Ok(vec![CpuId(0)])
        }

        fn resolve_thread(&self, _tid: Tid) -> Result<(), MonitorError> {
            Ok(())
        }

        fn new_driver(&self) -> Box<dyn EventDriver> {
            unreachable!("display tests never open events")
        }
    }

    fn render(verbose: u8, f: impl FnOnce(&mut Ctx<'_>)) -> String {
        let targets = Targets::cpus(vec![CpuId(0), CpuId(2), CpuId(4)]);
        let config = Config { verbose, ..Config::default() };
        let mut out = Vec::new();
        let mut reinit = false;
        let mut ctx = Ctx::new(&targets, &config, &NoHost, &mut out, &mut reinit);
        f(&mut ctx);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_lost_names_the_cpu_of_the_instance() {
        let text = render(0, |ctx| lost(ctx, &LostRecord { id: 1, lost: 9 }, 1));
        assert!(text.trim_end().ends_with("lost 9 events on CPU #2"), "{text}");
    }

    #[test]
    fn test_side_band_lines_need_verbosity() {
        let task = TaskRecord { pid: 10, ppid: 1, tid: 11, ptid: 1, time: 0 };
        assert!(render(1, |ctx| fork_exit(ctx, &task, 0, false)).is_empty());

        let text = render(2, |ctx| fork_exit(ctx, &task, 2, true));
        assert!(text.contains("exit ppid 1 ptid 1 pid 10 tid 11 on CPU #4"), "{text}");
    }

    #[test]
    fn test_switch_direction() {
        let text = render(2, |ctx| context_switch(ctx, &SwitchRecord { out: true }, 0));
        assert!(text.contains("switch out on CPU #0"), "{text}");

        let wide = SwitchCpuWideRecord { next_prev_pid: 5, next_prev_tid: 6, out: false };
        let text = render(2, |ctx| context_switch_cpu_wide(ctx, &wide, 0));
        assert!(text.contains("switch prev pid 5 tid 6"), "{text}");
    }

    #[test]
    fn test_timestamp_shape() {
        let stamp = timestamp();
        // 2024-01-02 03:04:05.123456
        assert_eq!(stamp.len(), 26);
        assert_eq!(&stamp[4..5], "-");
        assert_eq!(&stamp[19..20], ".");
    }
}
