//! Instance identifiers and filter enumeration.
//!
//! An instance is addressed as `app.instance`. A filter string selects a
//! subset of the declared instances: empty selects everything, `app`
//! selects every instance of one app, `app.instance` selects exactly one.

use std::fmt;

use crate::config::ClusterConfig;

/// An `(app, instance)` pair split from an `app.instance` identifier.
///
/// The instance component may be empty, meaning "all instances of app"
/// (or, if the app component is empty too, "all instances").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    app: String,
    instance: String,
}

impl InstanceId {
    /// Split an identifier on the first `.`.
    ///
    /// Everything before the first dot is the app, everything after it the
    /// instance. Without a dot the instance component is empty.
    pub fn split(name: &str) -> Self {
        let (app, instance) = match name.split_once('.') {
            Some((app, instance)) => (app, instance),
            None => (name, ""),
        };
        Self {
            app: app.to_string(),
            instance: instance.to_string(),
        }
    }

    /// The app component.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// The instance component (may be empty for filters).
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// True if the id names one concrete instance (non-empty instance part).
    pub fn is_concrete(&self) -> bool {
        !self.instance.is_empty()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.instance)
    }
}

/// Enumerate the declared instances matching `filter`.
///
/// Three modes:
/// - empty filter: every instance of every app
/// - `app`: every instance declared under that app
/// - `app.instance`: exactly that instance, if declared
///
/// Only sections with a non-empty instance component count as instances;
/// `default` and bare `app` sections are cascade layers, not instances.
pub fn enumerate(config: &ClusterConfig, filter: &str) -> Vec<InstanceId> {
    let wanted = InstanceId::split(filter);

    // A full app.instance filter that names a declared section wins outright.
    if wanted.is_concrete() && config.has_section(filter) {
        return vec![wanted];
    }

    let mut result = Vec::new();

    for section in config.section_names() {
        if section == "default" {
            continue;
        }

        let candidate = InstanceId::split(section);
        if !candidate.is_concrete() {
            continue;
        }

        let selected = if wanted.is_concrete() {
            section == filter
        } else {
            wanted.app().is_empty() || candidate.app() == wanted.app()
        };

        if selected {
            result.push(candidate);
        }
    }

    result
}
