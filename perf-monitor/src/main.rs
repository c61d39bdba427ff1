//! # perf-monitor - Main Entry Point
//!
//! Parses the command line, picks the monitor from the registry and runs it
//! until SIGINT/SIGTERM.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use perf_monitor::cli::Args;
use perf_monitor::config::Config;
use perf_monitor::domain::MonitorError;
use perf_monitor::engine::Engine;
use perf_monitor::host::SysHost;
use perf_monitor::monitor::Registry;
use perf_monitor::preflight::run_preflight_checks;
use perf_monitor::{monitors, signals};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_filter())).init();

    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<MonitorError>() {
            if e.is_config_error() {
                return EXIT_USAGE;
            }
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            if matches!(e.raw_os_error(), Some(libc::EACCES | libc::EPERM)) {
                return EXIT_NOPERM;
            }
        }
    }
    EXIT_ERROR
}

fn run(args: Args) -> Result<()> {
    let mut registry = Registry::new();
    monitors::register_all(&mut registry);

    if args.list {
        for name in registry.names() {
            let about = registry.find(name).map_or("", |m| m.about());
            println!("{name:<14} {about}");
        }
        return Ok(());
    }

    let name = args.monitor.clone().unwrap_or_default();
    let config = Config::from(args);
    let monitor = registry.select(&name)?;

    run_preflight_checks()?;
    signals::install(monitor.hooks().sigusr1).context("failed to install signal handlers")?;

    let host = SysHost::default();
    let mut engine = Engine::new(&config, &host, signals::stop_flag(), signals::usr1_flag());
    let passes = engine.run(monitor)?;
    info!("monitor({name}) exited after {passes} pass(es)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let usage = anyhow::Error::from(MonitorError::UnknownMonitor("nope".into()));
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);

        let denied = anyhow::Error::from(io::Error::from_raw_os_error(libc::EACCES))
            .context("failed to open cpu-clock");
        assert_eq!(exit_code_for(&denied), EXIT_NOPERM);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), EXIT_ERROR);
    }

    #[test]
    fn test_stage_wrapped_config_error_is_usage() {
        let err = anyhow::Error::from(MonitorError::Stage {
            monitor: "stat",
            stage: perf_monitor::domain::Stage::Init,
            source: MonitorError::MissingInterval("stat").into(),
        });
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
    }

    #[test]
    fn test_stage_wrapped_permission_error() {
        let err = anyhow::Error::from(MonitorError::Stage {
            monitor: "stat",
            stage: perf_monitor::domain::Stage::Open,
            source: anyhow::Error::from(io::Error::from_raw_os_error(libc::EPERM))
                .context("failed to open cycles"),
        });
        assert_eq!(exit_code_for(&err), EXIT_NOPERM);
    }
}
