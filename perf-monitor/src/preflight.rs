//! Pre-flight checks for perf-monitor
//!
//! Validates system requirements before the first event source is opened.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

/// Minimum kernel version; context-switch records arrived in 4.3
const MIN_KERNEL_VERSION: (u32, u32) = (4, 3);

/// Highest `perf_event_paranoid` level that still allows CPU-wide events
/// for unprivileged users.
const MAX_UNPRIVILEGED_PARANOID: i32 = 1;

/// Run all pre-flight checks against the running system.
///
/// # Errors
/// Returns an error if the kernel is too old.
pub fn run_preflight_checks() -> Result<()> {
    check_paranoid(Path::new("/proc/sys/kernel/perf_event_paranoid"), is_root());
    check_kernel_version(Path::new("/proc/sys/kernel/osrelease"))?;
    Ok(())
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Warn when an unprivileged user will likely be refused CPU-wide events.
/// Returns whether a warning was issued.
fn check_paranoid(path: &Path, root: bool) -> bool {
    if root {
        return false;
    }
    let level = match std::fs::read_to_string(path) {
        Ok(content) => content.trim().parse::<i32>().ok(),
        Err(e) => {
            debug!("cannot read {}: {e}", path.display());
            None
        }
    };
    match level {
        Some(level) if level > MAX_UNPRIVILEGED_PARANOID => {
            warn!(
                "perf_event_paranoid is {level}; opening events may fail without root. \
                 Lower it with: sudo sysctl kernel.perf_event_paranoid={MAX_UNPRIVILEGED_PARANOID}"
            );
            true
        }
        _ => false,
    }
}

/// Parse "5.15.0-generic" into (5, 15).
fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the kernel version is sufficient
fn check_kernel_version(path: &Path) -> Result<()> {
    let release = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read kernel version from {}", path.display()))?;

    let Some((major, minor)) = parse_release(&release) else {
        // Can't parse, assume it's fine
        warn!("unrecognized kernel release {:?}", release.trim());
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             perf-monitor requires Linux {}.{} or newer for context-switch records.\n\
             Current kernel: {}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release.trim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("6.1.0-arch1-1\n"), Some((6, 1)));
        assert_eq!(parse_release("4.19rc3"), Some((4, 19)));
        assert_eq!(parse_release("garbage"), None);
    }

    #[test]
    fn test_old_kernel_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "osrelease", "4.2.8\n");
        let err = check_kernel_version(&path).unwrap_err().to_string();
        assert!(err.contains("too old"), "{err}");

        let path = write(&dir, "osrelease", "4.3.0\n");
        assert!(check_kernel_version(&path).is_ok());
    }

    #[test]
    fn test_missing_release_is_an_error() {
        assert!(check_kernel_version(Path::new("/nonexistent/osrelease")).is_err());
    }

    #[test]
    fn test_paranoid_warning() {
        let dir = TempDir::new().unwrap();
        let strict = write(&dir, "strict", "2\n");
        let relaxed = write(&dir, "relaxed", "-1\n");

        assert!(check_paranoid(&strict, false));
        assert!(!check_paranoid(&strict, true));
        assert!(!check_paranoid(&relaxed, false));
        assert!(!check_paranoid(Path::new("/nonexistent"), false));
    }
}
