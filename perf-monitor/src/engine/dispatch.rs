//! Record dispatcher
//!
//! Decodes one raw ring-buffer record and hands it to the monitor method for
//! its kind. Monitors that do not override a method get the default printer.

use crate::domain::MonitorError;
use crate::events::RawRecord;
use crate::monitor::{Ctx, Monitor};
use crate::record::{self, Record};

/// Deliver `raw`, read from the ring of instance `ins`, to `monitor`.
///
/// # Errors
/// Returns an error for unknown or truncated records; nothing is delivered.
pub(crate) fn dispatch(
    monitor: &mut dyn Monitor,
    ctx: &mut Ctx<'_>,
    raw: RawRecord<'_>,
    ins: usize,
) -> Result<(), MonitorError> {
    match record::decode(raw)? {
        Record::Lost(r) => monitor.lost(ctx, &r, ins),
        Record::Fork(r) => monitor.fork(ctx, &r, ins),
        Record::Exit(r) => monitor.exit(ctx, &r, ins),
        Record::Comm(r) => monitor.comm(ctx, &r, ins),
        Record::Throttle(r) => monitor.throttle(ctx, &r, ins),
        Record::Unthrottle(r) => monitor.unthrottle(ctx, &r, ins),
        Record::Sample(r) => monitor.sample(ctx, &r, ins),
        Record::Switch(r) => monitor.context_switch(ctx, &r, ins),
        Record::SwitchCpuWide(r) => monitor.context_switch_cpu_wide(ctx, &r, ins),
    }
    Ok(())
}
