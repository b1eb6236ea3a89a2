// =============================================================================
// Lint Configuration
// =============================================================================

// Safety: deny unsafe by default, allow only where documented
// (Unix setsid in launcher.rs)
#![deny(unsafe_code)]
// Correctness: Must handle all fallible operations
#![deny(unused_must_use)]
// Quality: Pedantic but pragmatic
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
// Allowed with documented reasons
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::module_name_repetitions)] // e.g., config::ClusterConfig is clearer
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation

//! Library crate for tarantoolup - exposes the core for testing and integration.
//!
//! tarantoolup supervises single-binary Tarantool instances on one host:
//! it resolves per-instance configuration from a layered ini config,
//! provisions filesystem state, launches each instance as a detached
//! daemon and tracks liveness through pid files, including detection of
//! stale pid files left behind by crashes or pid-number reuse.
//!
//! # Modules
//!
//! - [`config`] - layered configuration cascade (`default < app < app.instance`)
//! - [`instance`] - instance identifiers and filter enumeration
//! - [`paths`] - per-instance directory resolution and provisioning
//! - [`liveness`] - pid files, process inspection, staleness detection
//! - [`launcher`] - detached daemon launch
//! - [`supervisor`] - batch start/stop orchestration

pub mod config;
pub mod error;
pub mod instance;
pub mod launcher;
pub mod liveness;
pub mod paths;
pub mod supervisor;
