//! Signal handling
//!
//! SIGINT and SIGTERM set the stop flag; SIGUSR1 sets a pending flag that
//! the dispatch loop consumes. Handlers are installed without `SA_RESTART`
//! so a signal interrupts the loop's blocking wait immediately. Nothing but
//! an atomic store happens in signal context.

#![allow(unsafe_code)] // sigaction() requires unsafe

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);
static USR1: AtomicBool = AtomicBool::new(false);

extern "C" fn on_stop(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

extern "C" fn on_usr1(_sig: libc::c_int) {
    USR1.store(true, Ordering::SeqCst);
}

/// Set by SIGINT/SIGTERM.
#[must_use]
pub fn stop_flag() -> &'static AtomicBool {
    &STOP
}

/// Set by SIGUSR1, cleared by the loop when it runs the hook.
#[must_use]
pub fn usr1_flag() -> &'static AtomicBool {
    &USR1
}

/// Install the stop handlers, and the SIGUSR1 handler when `usr1` is set.
/// Without it SIGUSR1 keeps its default action.
///
/// # Errors
/// Returns the OS error if a handler cannot be installed.
pub fn install(usr1: bool) -> io::Result<()> {
    watch(libc::SIGINT, on_stop)?;
    watch(libc::SIGTERM, on_stop)?;
    if usr1 {
        watch(libc::SIGUSR1, on_usr1)?;
    }
    Ok(())
}

fn watch(sig: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    // SAFETY: the action is fully initialized before use and the handler
    // only performs an atomic store.
    let ret = unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(sig, &action, std::ptr::null_mut())
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usr1_sets_pending_flag() {
        install(true).unwrap();
        USR1.store(false, Ordering::SeqCst);

        // SAFETY: raising a signal we just installed a handler for
        unsafe {
            libc::raise(libc::SIGUSR1);
        }

        assert!(usr1_flag().swap(false, Ordering::SeqCst));
        assert!(!stop_flag().load(Ordering::SeqCst));
    }
}
