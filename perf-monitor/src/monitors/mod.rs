//! Built-in monitors
//!
//! - `stat`: pull-mode counter deltas per interval
//! - `task-watch`: fork/exit/comm/switch side-band records
//! - `trace`: tracepoint samples

pub mod stat;
pub mod task_watch;
pub mod trace;

use crate::monitor::Registry;

pub use stat::Stat;
pub use task_watch::TaskWatch;
pub use trace::Trace;

/// Register every built-in monitor.
pub fn register_all(registry: &mut Registry) {
    registry.register(Box::new(Stat::default()));
    registry.register(Box::new(TaskWatch::default()));
    registry.register(Box::new(Trace::default()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let mut registry = Registry::default();
        register_all(&mut registry);
        assert_eq!(registry.names(), vec!["stat", "task-watch", "trace"]);
    }
}
