//! Typed errors for supervisor operations.
//!
//! Fatal conditions (missing directories, missing binary, spawn failure)
//! surface here as structured variants; recoverable conditions (missing
//! config file, stale pid files, already-running instances) are handled
//! in place and never reach this taxonomy.

use std::path::PathBuf;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A required directory does not exist after resolution.
    #[error("unable to find {kind} dir: {path}")]
    DirectoryMissing { kind: &'static str, path: PathBuf },

    /// The managed binary was found neither in the app dir nor on PATH.
    #[error("unable to find tarantool binary for instance {instance}")]
    BinaryNotFound { instance: String },

    /// The entry script is missing from the app directory.
    #[error("unable to find init.lua for instance {instance}")]
    EntryScriptNotFound { instance: String },

    /// The detached child could not be created.
    #[error("unable to spawn instance {instance}: {source}")]
    Spawn {
        instance: String,
        #[source]
        source: std::io::Error,
    },

    /// Signal delivery to a live pid failed.
    #[error("unable to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a missing-directory error.
    pub fn directory_missing(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::DirectoryMissing {
            kind,
            path: path.into(),
        }
    }
}
