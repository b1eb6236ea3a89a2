//! Layered configuration for instance resolution.
//!
//! Config files are ini-style, keyed by section: `default`, `<app>` and
//! `<app>.<instance>`. An instance's effective configuration is the
//! cascade `default < app < app.instance`, with compiled-in defaults
//! below all three. The whole-section merge and the single-key lookup
//! both resolve the same winner for any key; a property test in this
//! module checks the two code paths against each other.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ini::Ini;

use crate::instance::InstanceId;

/// Effective key/value view for one instance, produced by [`ClusterConfig::merge`].
pub type MergedConfig = BTreeMap<String, String>;

/// The layered cluster configuration for one command invocation.
///
/// Immutable once loaded; the compiled-in defaults table travels with the
/// value instead of living in mutable module state.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    defaults: BTreeMap<String, String>,
}

impl ClusterConfig {
    /// Load configuration from an ini file.
    ///
    /// Values are trimmed. Missing files are the caller's concern: the
    /// command layer warns and proceeds with an empty config instead.
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Ok(Self::from_ini(&ini))
    }

    /// Build a config from parsed ini data.
    fn from_ini(ini: &Ini) -> Self {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for (section, properties) in ini.iter() {
            // Keys outside any [section] have no place in the cascade.
            let Some(section) = section else { continue };

            let entry = sections.entry(section.to_string()).or_default();
            for (key, value) in properties.iter() {
                entry.insert(key.to_string(), value.trim().to_string());
            }
        }

        Self {
            sections,
            defaults: BTreeMap::new(),
        }
    }

    /// Replace the compiled-in defaults table.
    ///
    /// Defaults sit below the whole cascade: any `default`, `app` or
    /// `app.instance` section overrides them.
    #[must_use]
    pub fn with_defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Insert a single key, creating the section if needed. Test and
    /// setup convenience; loaded configs are never mutated.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// True if a section with this exact name is declared.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// All declared section names, in deterministic order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Merge the cascade for one instance into a flat mapping.
    ///
    /// Layers `default`, `app`, `app.instance` in that order; later layers
    /// overwrite identical keys. Missing sections are skipped. Compiled-in
    /// defaults seed the result below all three layers.
    pub fn merge(&self, id: &InstanceId) -> MergedConfig {
        let mut result = self.defaults.clone();

        for section in self.cascade_sections(id) {
            if let Some(values) = self.sections.get(&section) {
                for (key, value) in values {
                    result.insert(key.clone(), value.clone());
                }
            }
        }

        result
    }

    /// Look up one key for one instance.
    ///
    /// Searches sections in reverse specificity order (`app.instance`,
    /// `app`, `default`), then the compiled-in defaults. Must agree with
    /// [`merge`](Self::merge) on the winner for every key.
    pub fn get(&self, id: &InstanceId, key: &str) -> Option<&str> {
        for section in self.cascade_sections(id).iter().rev() {
            if let Some(value) = self.sections.get(section).and_then(|s| s.get(key)) {
                return Some(value);
            }
        }

        self.defaults.get(key).map(String::as_str)
    }

    /// Cascade section names for an instance, least specific first.
    fn cascade_sections(&self, id: &InstanceId) -> [String; 3] {
        [
            "default".to_string(),
            id.app().to_string(),
            format!("{}.{}", id.app(), id.instance()),
        ]
    }
}

/// The compiled-in defaults table, below the whole cascade.
///
/// Empty today, but threaded through [`ClusterConfig::with_defaults`] so
/// lookups have a single fallback point. Directory keys (`work_dir`,
/// `run_dir`, `data_dir`, `log_dir`, `app_dir`) must never appear here:
/// the work-dir derivation in [`crate::paths`] only runs for keys the
/// config leaves unset.
pub fn builtin_defaults() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Locate the config file, checking the conventional candidates in order.
///
/// Falls back to `tarantool.ini` in the working directory when nothing
/// exists, so the caller can report one concrete missing path.
pub fn find_config_file() -> PathBuf {
    let mut candidates = vec![
        PathBuf::from("tarantool.ini"),
        PathBuf::from(".tarantool.ini"),
    ];

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config/tarantool/tarantool.ini"));
    }
    candidates.push(PathBuf::from("/etc/tarantool/tarantool.ini"));

    for candidate in candidates {
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from("tarantool.ini")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cascade_fixture() -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.set("default", "x", "1");
        config.set("app", "x", "2");
        config.set("app", "y", "3");
        config.set("app.instance", "y", "4");
        config
    }

    #[test]
    fn test_merge_cascade() {
        let config = cascade_fixture();
        let merged = config.merge(&InstanceId::split("app.instance"));
        assert_eq!(merged.get("x").map(String::as_str), Some("2"));
        assert_eq!(merged.get("y").map(String::as_str), Some("4"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_get_reverse_specificity() {
        let config = cascade_fixture();
        let id = InstanceId::split("app.instance");
        assert_eq!(config.get(&id, "y"), Some("4"));
        assert_eq!(config.get(&id, "x"), Some("2"));
        assert_eq!(config.get(&id, "z"), None);
    }

    #[test]
    fn test_get_falls_back_to_builtin_defaults() {
        let defaults = BTreeMap::from([("memtx_memory".to_string(), "268435456".to_string())]);
        let config = cascade_fixture().with_defaults(defaults);
        let id = InstanceId::split("app.instance");

        assert_eq!(config.get(&id, "memtx_memory"), Some("268435456"));
        // Cascade layers still win over the defaults table.
        assert_eq!(config.get(&id, "x"), Some("2"));
    }

    #[test]
    fn test_merge_includes_defaults() {
        let defaults = BTreeMap::from([("memtx_memory".to_string(), "268435456".to_string())]);
        let config = cascade_fixture().with_defaults(defaults);
        let merged = config.merge(&InstanceId::split("app.instance"));
        assert_eq!(merged.get("memtx_memory").map(String::as_str), Some("268435456"));
    }

    #[test]
    fn test_builtin_defaults_leave_directories_unset() {
        let config = ClusterConfig::default().with_defaults(builtin_defaults());
        let id = InstanceId::split("app.r1");

        for key in ["work_dir", "run_dir", "data_dir", "log_dir", "app_dir"] {
            assert_eq!(config.get(&id, key), None);
        }
    }

    #[test]
    fn test_merge_missing_sections_skipped() {
        let mut config = ClusterConfig::default();
        config.set("other.r1", "k", "v");
        let merged = config.merge(&InstanceId::split("app.instance"));
        assert!(merged.is_empty());
    }

    #[test]
    fn test_from_ini_trims_values() {
        let ini = Ini::load_from_str(
            "[default]\nwork_dir = /var/lib/tt  \n\n[myapp.r1]\nlisten = 3301\n",
        )
        .unwrap();
        let config = ClusterConfig::from_ini(&ini);

        let id = InstanceId::split("myapp.r1");
        assert_eq!(config.get(&id, "work_dir"), Some("/var/lib/tt"));
        assert_eq!(config.get(&id, "listen"), Some("3301"));
        assert!(config.has_section("myapp.r1"));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClusterConfig::load(&dir.path().join("nope.ini"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tarantool.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[default]").unwrap();
        writeln!(file, "work_dir = ./data").unwrap();
        writeln!(file, "[myapp.r1]").unwrap();
        drop(file);

        let config = ClusterConfig::load(&path).unwrap();
        assert!(config.has_section("myapp.r1"));
        assert_eq!(
            config.get(&InstanceId::split("myapp.r1"), "work_dir"),
            Some("./data")
        );
    }
}
