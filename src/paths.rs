//! Per-instance directory resolution and provisioning.
//!
//! All directory creation the supervisor performs happens here, through
//! one idempotent [`ensure_dir`]. Consumers of [`InstancePaths`] treat it
//! as read-only.
//!
//! Resolution rules:
//! - `app_dir`: configured `app_dir/<app>` if set; else the working
//!   directory itself when it holds a self-contained app layout
//!   (`init.lua` plus `<app>-scm-1.rockspec`); else `<cwd>/<app>`.
//! - `run_dir`/`data_dir`/`log_dir`: configured values if set; any missing
//!   one is derived under a common `work_dir` (default `<cwd>/tarantooldata`),
//!   created on first use.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::instance::InstanceId;

/// Entry script every app directory must contain.
pub const ENTRY_SCRIPT: &str = "init.lua";

/// Default work directory under the current working directory.
pub const DEFAULT_WORK_DIR: &str = "tarantooldata";

/// Resolved absolute filesystem state for one instance.
///
/// Owned by this module; [`crate::launcher`] and [`crate::liveness`]
/// consume it read-only.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    /// Directory holding the app's code and entry script.
    pub app_dir: PathBuf,
    /// Directory holding pid files and control sockets.
    pub run_dir: PathBuf,
    /// Directory holding per-instance data subdirectories.
    pub data_dir: PathBuf,
    /// Directory holding instance log files.
    pub log_dir: PathBuf,
    /// The instance's private data subdirectory (`data_dir/<app.instance>`).
    pub instance_data_dir: PathBuf,
    /// `run_dir/<app.instance>.pid`
    pub pid_file: PathBuf,
    /// `run_dir/<app.instance>.control`
    pub console_sock: PathBuf,
    /// `log_dir/<app.instance>.log`
    pub log_file: PathBuf,
}

/// Resolve and provision the directories for one instance, relative to
/// the current working directory.
pub fn resolve(config: &ClusterConfig, id: &InstanceId) -> Result<InstancePaths> {
    let cwd = env::current_dir().map_err(|e| Error::io("getting working directory", e))?;
    resolve_in(config, id, &cwd)
}

/// [`resolve`] with an explicit base directory. Split out so tests can
/// run against a scratch directory instead of the process cwd.
pub fn resolve_in(config: &ClusterConfig, id: &InstanceId, cwd: &Path) -> Result<InstancePaths> {
    let app_dir = find_app_dir(config, id, cwd);

    // Configured values may be relative; anchor them to the base dir
    // right away so nothing downstream depends on the process cwd.
    let configured_run = config
        .get(id, "run_dir")
        .map(|p| absolutize(cwd, PathBuf::from(p)));
    let configured_data = config
        .get(id, "data_dir")
        .map(|p| absolutize(cwd, PathBuf::from(p)));
    let configured_log = config
        .get(id, "log_dir")
        .map(|p| absolutize(cwd, PathBuf::from(p)));

    // Any unconfigured directory is derived under a shared work dir,
    // created on first use.
    let work_dir = config.get(id, "work_dir").map_or_else(
        || cwd.join(DEFAULT_WORK_DIR),
        |p| absolutize(cwd, PathBuf::from(p)),
    );
    if configured_run.is_none() || configured_data.is_none() || configured_log.is_none() {
        ensure_dir(&work_dir)?;
    }

    let run_dir = match configured_run {
        Some(dir) => dir,
        None => derive_subdir(&work_dir, "run")?,
    };
    let data_dir = match configured_data {
        Some(dir) => dir,
        None => derive_subdir(&work_dir, "data")?,
    };
    let log_dir = match configured_log {
        Some(dir) => dir,
        None => derive_subdir(&work_dir, "log")?,
    };

    // Everything must exist after resolution; a configured-but-absent
    // directory is a fatal diagnostic, never silently created.
    require_dir("run", &run_dir)?;
    require_dir("data", &data_dir)?;
    require_dir("log", &log_dir)?;
    require_dir("app", &app_dir)?;

    // The launched child changes its working directory, so every path
    // handed out must survive a chdir. Canonicalize once existence is
    // established.
    let run_dir = canonical_dir(&run_dir)?;
    let data_dir = canonical_dir(&data_dir)?;
    let log_dir = canonical_dir(&log_dir)?;
    let app_dir = canonical_dir(&app_dir)?;

    let instance_data_dir = data_dir.join(id.to_string());
    ensure_dir(&instance_data_dir)?;

    let name = id.to_string();
    Ok(InstancePaths {
        pid_file: run_dir.join(format!("{name}.pid")),
        console_sock: run_dir.join(format!("{name}.control")),
        log_file: log_dir.join(format!("{name}.log")),
        app_dir,
        run_dir,
        data_dir,
        log_dir,
        instance_data_dir,
    })
}

/// Locate the app directory for an instance.
fn find_app_dir(config: &ClusterConfig, id: &InstanceId, cwd: &Path) -> PathBuf {
    if let Some(app_dir) = config.get(id, "app_dir") {
        return absolutize(cwd, Path::new(app_dir).join(id.app()));
    }

    // Self-contained layout: the working directory is the app when it
    // carries both the entry script and the matching rockspec.
    let init = cwd.join(ENTRY_SCRIPT);
    let rockspec = cwd.join(format!("{}-scm-1.rockspec", id.app()));
    if init.exists() && rockspec.exists() {
        return fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
    }

    cwd.join(id.app())
}

/// Anchor a possibly relative configured path to the base directory.
fn absolutize(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Canonical form of a directory already known to exist.
fn canonical_dir(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path)
        .map_err(|e| Error::io(format!("resolving directory {}", path.display()), e))
}

/// Derive and create one work-dir subdirectory.
fn derive_subdir(work_dir: &Path, name: &str) -> Result<PathBuf> {
    let dir = work_dir.join(name);
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Idempotent directory creation.
fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| Error::io(format!("creating directory {}", path.display()), e))
}

fn require_dir(kind: &'static str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::directory_missing(kind, path))
    }
}
