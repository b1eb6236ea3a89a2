//! Batch start/stop orchestration over the selected instance set.
//!
//! The supervisor iterates the enumerated instances sequentially and
//! isolates failures per instance: every instance is attempted, failures
//! are reported as they happen, and the whole invocation fails afterwards
//! if any instance did.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::config::ClusterConfig;
use crate::error::Error;
use crate::instance::{self, InstanceId};
use crate::launcher::{self, LaunchOutcome, BINARY_NAME};
use crate::liveness::{self, ProcessInspector};
use crate::paths;

/// Orchestrates start/stop for one command invocation.
pub struct Supervisor<'a> {
    config: &'a ClusterConfig,
    inspector: &'a dyn ProcessInspector,
    base_dir: PathBuf,
}

impl<'a> Supervisor<'a> {
    /// Supervisor rooted at the current working directory.
    pub fn new(config: &'a ClusterConfig, inspector: &'a dyn ProcessInspector) -> Result<Self> {
        let base_dir = env::current_dir().context("Failed to get working directory")?;
        Ok(Self::with_base_dir(config, inspector, base_dir))
    }

    /// Supervisor rooted at an explicit directory. Used by tests to run
    /// against a scratch directory instead of the process cwd.
    pub fn with_base_dir(
        config: &'a ClusterConfig,
        inspector: &'a dyn ProcessInspector,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            inspector,
            base_dir,
        }
    }

    /// Start every instance matching `filter`.
    ///
    /// Already-running instances are skipped with a message, not an error.
    pub fn start(&self, filter: &str) -> Result<()> {
        self.for_each(filter, "start", |id| self.start_instance(id))
    }

    /// Stop every instance matching `filter`.
    ///
    /// Stale pid files are removed without signalling anything; live pids
    /// get a termination signal.
    pub fn stop(&self, filter: &str) -> Result<()> {
        self.for_each(filter, "stop", |id| self.stop_instance(id))
    }

    fn for_each(
        &self,
        filter: &str,
        verb: &str,
        op: impl Fn(&InstanceId) -> crate::error::Result<()>,
    ) -> Result<()> {
        let ids = instance::enumerate(self.config, filter);
        if ids.is_empty() {
            tracing::warn!(filter, "No instances match filter");
            return Ok(());
        }

        let mut failed = 0usize;
        for id in &ids {
            if let Err(e) = op(id) {
                eprintln!("Failed to {verb} {id}: {e}");
                tracing::error!(instance = %id, error = %e, "Instance operation failed");
                failed += 1;
            }
        }

        if failed > 0 {
            bail!("{failed} of {} instances failed to {verb}", ids.len());
        }
        Ok(())
    }

    fn start_instance(&self, id: &InstanceId) -> crate::error::Result<()> {
        let paths = paths::resolve_in(self.config, id, &self.base_dir)?;

        match launcher::launch(self.config, id, &paths, self.inspector)? {
            LaunchOutcome::Started { pid } => {
                println!("Starting: {id}");
                tracing::debug!(instance = %id, pid, "Instance launched");
            },
            LaunchOutcome::AlreadyRunning { pid } => {
                println!("Already running: {id}");
                tracing::debug!(instance = %id, pid, "Launch skipped");
            },
        }
        Ok(())
    }

    fn stop_instance(&self, id: &InstanceId) -> crate::error::Result<()> {
        let paths = paths::resolve_in(self.config, id, &self.base_dir)?;

        // A stale pid file means nothing is left to signal.
        if liveness::clear_if_stale(&paths.pid_file, self.inspector, BINARY_NAME)? {
            println!("Removing stale pid file: {}", paths.pid_file.display());
            return Ok(());
        }

        let Some(pid) = liveness::read_pid(&paths.pid_file, self.inspector) else {
            return Ok(());
        };

        println!("Stopping: {id}");
        terminate(pid)
    }
}

/// Send the termination signal to a live pid.
#[cfg(unix)]
#[allow(clippy::cast_possible_wrap)]
fn terminate(pid: u32) -> crate::error::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;

    signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| Error::Signal {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(windows)]
fn terminate(pid: u32) -> crate::error::Result<()> {
    use std::process::Command;

    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .status()
        .map_err(|e| Error::io(format!("running taskkill for pid {pid}"), e))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Signal {
            pid,
            reason: format!("taskkill exited with {status}"),
        })
    }
}
