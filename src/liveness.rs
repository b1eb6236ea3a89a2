//! Pid files, process inspection and staleness detection.
//!
//! A pid file is only weak evidence that an instance is running: the
//! instance may have crashed without cleanup and the OS may have handed
//! the pid to an unrelated process since. [`is_stale`] cross-checks the
//! pid file against the process table (existence, start time, command
//! name) before the supervisor trusts it.
//!
//! Process-table access goes through the [`ProcessInspector`] capability
//! so tests can substitute a fake table.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Process-table snapshot for one pid. Queried on demand, never cached
/// across calls: the process table can change between checks.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Approximate process start time; `None` when undeterminable.
    pub start_time: Option<SystemTime>,
    /// Command name as the process table reports it.
    pub name: String,
}

/// Capability for querying the OS process table.
pub trait ProcessInspector {
    /// Cheap signal-0 style existence probe.
    fn exists(&self, pid: u32) -> bool;

    /// Snapshot start time and command name; `None` if the pid is gone.
    fn inspect(&self, pid: u32) -> Option<ProcessInfo>;
}

/// Inspector backed by the real process table via sysinfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInspector;

impl ProcessInspector for SystemInspector {
    #[cfg(unix)]
    #[allow(clippy::cast_possible_wrap)]
    fn exists(&self, pid: u32) -> bool {
        use nix::sys::signal;
        use nix::unistd::Pid as NixPid;

        // Signal 0 probes existence without delivering anything. EPERM
        // counts as dead here: a pid we may not signal is not ours.
        signal::kill(NixPid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    fn exists(&self, pid: u32) -> bool {
        self.inspect(pid).is_some()
    }

    fn inspect(&self, pid: u32) -> Option<ProcessInfo> {
        let mut system = System::new();
        let target = Pid::from(pid as usize);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        let process = system.process(target)?;
        let start_secs = process.start_time();
        let start_time = (start_secs > 0).then(|| UNIX_EPOCH + Duration::from_secs(start_secs));

        Some(ProcessInfo {
            start_time,
            name: process.name().to_string_lossy().into_owned(),
        })
    }
}

/// Read the pid recorded in a pid file, verified against the process table.
///
/// Returns `None` when the file does not exist, cannot be parsed, or the
/// recorded process no longer exists. Unparsable content is logged and
/// treated as absent; the staleness path cleans the file up.
pub fn read_pid(pid_file: &Path, inspector: &dyn ProcessInspector) -> Option<u32> {
    if !pid_file.exists() {
        return None;
    }

    let content = match fs::read_to_string(pid_file) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(pid_file = %pid_file.display(), error = %e, "Unreadable pid file");
            return None;
        },
    };

    let pid = match content.trim().parse::<u32>() {
        Ok(pid) => pid,
        Err(_) => {
            tracing::warn!(
                pid_file = %pid_file.display(),
                "Pid file does not contain a pid"
            );
            return None;
        },
    };

    inspector.exists(pid).then_some(pid)
}

/// Decide whether a pid file is stale.
///
/// Stale means any of:
/// - the pid cannot be read or the process no longer exists
/// - the process start time cannot be determined
/// - the pid file's mtime (rounded up) predates the process start time
///   (rounded down) - the pid-recycling signal: the file was written for
///   an earlier holder of this pid
/// - the command name does not contain `expected_name`
pub fn is_stale(pid_file: &Path, inspector: &dyn ProcessInspector, expected_name: &str) -> bool {
    let Some(pid) = read_pid(pid_file, inspector) else {
        return true;
    };

    let Some(info) = inspector.inspect(pid) else {
        return true;
    };

    let Some(start_time) = info.start_time else {
        return true;
    };

    let Some(mtime) = pid_file_mtime(pid_file) else {
        return true;
    };

    if ceil_secs(mtime) < floor_secs(start_time) {
        tracing::debug!(
            pid_file = %pid_file.display(),
            pid,
            "Pid file predates process start, pid was recycled"
        );
        return true;
    }

    if !info.name.contains(expected_name) {
        tracing::debug!(
            pid_file = %pid_file.display(),
            pid,
            name = %info.name,
            "Pid belongs to a foreign process"
        );
        return true;
    }

    false
}

/// Remove a pid file if it exists and is stale. Returns true when a file
/// was removed. Self-healing: staleness is never surfaced as an error.
pub fn clear_if_stale(
    pid_file: &Path,
    inspector: &dyn ProcessInspector,
    expected_name: &str,
) -> Result<bool> {
    if !pid_file.exists() || !is_stale(pid_file, inspector, expected_name) {
        return Ok(false);
    }

    fs::remove_file(pid_file)
        .map_err(|e| Error::io(format!("removing stale pid file {}", pid_file.display()), e))?;
    tracing::info!(pid_file = %pid_file.display(), "Removed stale pid file");
    Ok(true)
}

fn pid_file_mtime(pid_file: &Path) -> Option<SystemTime> {
    fs::metadata(pid_file).and_then(|m| m.modified()).ok()
}

/// Whole seconds since the epoch, rounded up.
fn ceil_secs(t: SystemTime) -> u64 {
    let dur = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    dur.as_secs() + u64::from(dur.subsec_nanos() > 0)
}

/// Whole seconds since the epoch, rounded down.
fn floor_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Fake process table with one configurable entry.
    struct FakeInspector {
        pid: u32,
        alive: bool,
        info: Option<ProcessInfo>,
    }

    impl FakeInspector {
        fn alive(pid: u32, name: &str, started_secs_ago: u64) -> Self {
            Self {
                pid,
                alive: true,
                info: Some(ProcessInfo {
                    start_time: Some(SystemTime::now() - Duration::from_secs(started_secs_ago)),
                    name: name.to_string(),
                }),
            }
        }

        fn dead(pid: u32) -> Self {
            Self {
                pid,
                alive: false,
                info: None,
            }
        }
    }

    impl ProcessInspector for FakeInspector {
        fn exists(&self, pid: u32) -> bool {
            self.alive && pid == self.pid
        }

        fn inspect(&self, pid: u32) -> Option<ProcessInfo> {
            if self.alive && pid == self.pid {
                self.info.clone()
            } else {
                None
            }
        }
    }

    fn write_pid_file(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("test.pid");
        let mut file = File::create(&path).unwrap();
        write!(file, "{content}").unwrap();
        path
    }

    #[test]
    fn test_read_pid_missing_file() {
        let dir = TempDir::new().unwrap();
        let inspector = FakeInspector::alive(42, "tarantool", 60);
        assert_eq!(read_pid(&dir.path().join("none.pid"), &inspector), None);
    }

    #[test]
    fn test_read_pid_garbage_content() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "not-a-pid");
        let inspector = FakeInspector::alive(42, "tarantool", 60);
        assert_eq!(read_pid(&path, &inspector), None);
    }

    #[test]
    fn test_read_pid_dead_process() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::dead(42);
        assert_eq!(read_pid(&path, &inspector), None);
    }

    #[test]
    fn test_read_pid_live_process() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42\n");
        let inspector = FakeInspector::alive(42, "tarantool", 60);
        assert_eq!(read_pid(&path, &inspector), Some(42));
    }

    #[test]
    fn test_stale_when_process_dead() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::dead(42);
        assert!(is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_stale_when_start_time_unknown() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector {
            pid: 42,
            alive: true,
            info: Some(ProcessInfo {
                start_time: None,
                name: "tarantool".to_string(),
            }),
        };
        assert!(is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_stale_when_pid_recycled() {
        // Process "started" well after the pid file was written.
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector {
            pid: 42,
            alive: true,
            info: Some(ProcessInfo {
                start_time: Some(SystemTime::now() + Duration::from_secs(3600)),
                name: "tarantool".to_string(),
            }),
        };
        assert!(is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_stale_when_name_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::alive(42, "postgres", 3600);
        assert!(is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_not_stale_for_matching_older_process() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::alive(42, "tarantool", 3600);
        assert!(!is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_name_substring_matches() {
        // Process tables often report the full binary path.
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::alive(42, "/usr/bin/tarantool", 3600);
        assert!(!is_stale(&path, &inspector, "tarantool"));
    }

    #[test]
    fn test_clear_if_stale_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::dead(42);

        assert!(clear_if_stale(&path, &inspector, "tarantool").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_if_stale_keeps_fresh_file() {
        let dir = TempDir::new().unwrap();
        let path = write_pid_file(&dir, "42");
        let inspector = FakeInspector::alive(42, "tarantool", 3600);

        assert!(!clear_if_stale(&path, &inspector, "tarantool").unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_clear_if_stale_no_file() {
        let dir = TempDir::new().unwrap();
        let inspector = FakeInspector::dead(42);
        assert!(!clear_if_stale(&dir.path().join("none.pid"), &inspector, "tarantool").unwrap());
    }

    #[test]
    fn test_system_inspector_current_process() {
        // The test process itself is always visible and alive.
        let inspector = SystemInspector;
        let pid = std::process::id();
        assert!(inspector.exists(pid));

        let info = inspector.inspect(pid).expect("current process visible");
        assert!(!info.name.is_empty());
    }

    #[test]
    fn test_system_inspector_nonexistent_process() {
        let inspector = SystemInspector;
        let fake_pid = u32::MAX - 1;
        assert!(inspector.inspect(fake_pid).is_none());
    }

    #[test]
    fn test_rounding_boundaries() {
        let t = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(ceil_secs(t), 100);
        assert_eq!(floor_secs(t), 100);

        let t = UNIX_EPOCH + Duration::from_millis(100_500);
        assert_eq!(ceil_secs(t), 101);
        assert_eq!(floor_secs(t), 100);
    }
}
