//! Detached launch of instance processes.
//!
//! The launcher runs a preflight (stale pid cleanup, already-running
//! check), resolves the binary and entry script, builds the instance
//! environment from the merged config, and spawns the instance as a
//! session-detached child. The parent returns immediately; the child is
//! expected to write its own pid file via `TARANTOOL_PID_FILE`.
//!
//! Stream policy: stdin comes from the null device; stdout/stderr are
//! appended to the instance log file so early startup failures are
//! captured even before the instance opens `TARANTOOL_LOG_FILE` itself.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{ClusterConfig, MergedConfig};
use crate::error::{Error, Result};
use crate::instance::InstanceId;
use crate::liveness::{self, ProcessInspector};
use crate::paths::{InstancePaths, ENTRY_SCRIPT};

/// Name of the managed binary, also the staleness name check substring.
pub const BINARY_NAME: &str = "tarantool";

/// Prefix for every environment variable passed to an instance.
pub const ENV_PREFIX: &str = "TARANTOOL_";

/// Result of a launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new detached instance process was spawned.
    Started { pid: u32 },
    /// A live instance already holds the pid file; nothing was launched.
    AlreadyRunning { pid: u32 },
}

/// Launch one instance as a detached daemon.
///
/// Idempotent with respect to running instances: a live pid file short-
/// circuits into [`LaunchOutcome::AlreadyRunning`], a stale one is
/// deleted before launching.
pub fn launch(
    config: &ClusterConfig,
    id: &InstanceId,
    paths: &InstancePaths,
    inspector: &dyn ProcessInspector,
) -> Result<LaunchOutcome> {
    liveness::clear_if_stale(&paths.pid_file, inspector, BINARY_NAME)?;

    if let Some(pid) = liveness::read_pid(&paths.pid_file, inspector) {
        return Ok(LaunchOutcome::AlreadyRunning { pid });
    }

    let binary = find_binary(&paths.app_dir).ok_or_else(|| Error::BinaryNotFound {
        instance: id.to_string(),
    })?;
    let binary = canonical(&binary)?;

    let entry = paths.app_dir.join(ENTRY_SCRIPT);
    if !entry.exists() {
        return Err(Error::EntryScriptNotFound {
            instance: id.to_string(),
        });
    }
    let entry = canonical(&entry)?;

    let env = build_env(&config.merge(id), id, paths);

    spawn_detached(&binary, &entry, &env, id, paths)
}

/// Build the environment map for an instance.
///
/// Every merged config key becomes `TARANTOOL_<UPPERCASED_KEY>`, plus the
/// synthesized pid-file, instance-name, console-socket and log-file
/// variables the instance needs to wire itself up.
pub fn build_env(
    merged: &MergedConfig,
    id: &InstanceId,
    paths: &InstancePaths,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for (key, value) in merged {
        env.insert(format!("{ENV_PREFIX}{}", key.to_uppercase()), value.clone());
    }

    env.insert(
        format!("{ENV_PREFIX}PID_FILE"),
        paths.pid_file.display().to_string(),
    );
    env.insert(format!("{ENV_PREFIX}INSTANCE_NAME"), id.to_string());
    env.insert(
        format!("{ENV_PREFIX}CONSOLE_SOCK"),
        paths.console_sock.display().to_string(),
    );
    env.insert(
        format!("{ENV_PREFIX}LOG_FILE"),
        paths.log_file.display().to_string(),
    );

    env
}

/// Resolve the binary to run: a copy bundled in the app dir wins over
/// whatever `PATH` offers.
fn find_binary(app_dir: &Path) -> Option<PathBuf> {
    let bundled = app_dir.join(BINARY_NAME);
    if bundled.exists() {
        return Some(bundled);
    }

    which(BINARY_NAME)
}

/// Search `PATH` for an executable.
fn which(name: &str) -> Option<PathBuf> {
    which_in(name, &env::var_os("PATH")?)
}

fn which_in(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Spawn the instance process detached from our session.
///
/// # Safety
///
/// On Unix this uses `pre_exec` to call `setsid()`, which creates a new
/// session for the child. `setsid()` is async-signal-safe and the closure
/// performs no allocation or locking, so this is safe in the fork window.
#[allow(unsafe_code)] // SAFETY: Unix pre_exec/setsid for session detachment
fn spawn_detached(
    binary: &Path,
    entry: &Path,
    env: &BTreeMap<String, String>,
    id: &InstanceId,
    paths: &InstancePaths,
) -> Result<LaunchOutcome> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)
        .map_err(|e| Error::io(format!("opening log file {}", paths.log_file.display()), e))?;
    let log_file_err = log_file
        .try_clone()
        .map_err(|e| Error::io("duplicating log file handle", e))?;

    let mut cmd = Command::new(binary);
    cmd.arg(entry)
        // The instance sees exactly the resolved environment, nothing
        // inherited from the supervisor.
        .env_clear()
        .envs(env)
        .current_dir(&paths.instance_data_dir)
        .stdin(Stdio::null())
        .stdout(log_file)
        .stderr(log_file_err);

    #[cfg(unix)]
    {
        use nix::libc;
        use std::os::unix::process::CommandExt;

        unsafe {
            cmd.pre_exec(|| {
                // New session, no controlling terminal.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;

        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const DETACHED_PROCESS: u32 = 0x0000_0008;

        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    }

    let child = cmd.spawn().map_err(|e| Error::Spawn {
        instance: id.to_string(),
        source: e,
    })?;

    let pid = child.id();

    // Dropping the handle only closes our side; the detached child keeps
    // running independently.
    drop(child);

    tracing::info!(
        instance = %id,
        pid,
        binary = %binary.display(),
        log = %paths.log_file.display(),
        "Spawned instance"
    );

    Ok(LaunchOutcome::Started { pid })
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path)
        .map_err(|e| Error::io(format!("resolving path {}", path.display()), e))
}
