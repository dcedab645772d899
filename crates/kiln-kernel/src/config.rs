//! Host configuration surface.
//!
//! Settings layer in the usual order: built-in defaults, then an optional
//! configuration file, then `KILN_`-prefixed environment variables. The
//! reload engine consumes [`ReloadSettings`]; the directory layout feeds
//! the rewriter's dependency search path.

use std::path::{Path, PathBuf};

use config::{Config as Cfg, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::Key;

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Settings the reload engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSettings {
    /// Load all modules from the scripts folder when the host starts.
    pub load_on_start: bool,
    /// Key that triggers a manual reload pass.
    pub reload_key: Key,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            load_on_start: false,
            reload_key: Key::F6,
        }
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host installation root. The scripts directory lives beneath it.
    pub root_dir: PathBuf,
    /// Override for the host's managed-libraries directory.
    pub managed_libs: Option<PathBuf>,
    /// Override for the framework's own library directory.
    pub framework_libs: Option<PathBuf>,
    #[serde(default)]
    pub reload: ReloadSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            managed_libs: None,
            framework_libs: None,
            reload: ReloadSettings::default(),
        }
    }
}

impl HostConfig {
    /// Loads configuration from defaults, then `path` (if given), then
    /// `KILN_*` environment variables (`KILN_RELOAD__RELOAD_KEY=F5`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Cfg::builder()
            .set_default("root_dir", ".")?
            .set_default("reload.load_on_start", false)?
            .set_default("reload.reload_key", "F6")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            .add_source(Environment::with_prefix("KILN").separator("__"))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// `<root>/scripts`, the directory the reload engine scans.
    pub fn scripts_dir(&self) -> PathBuf {
        self.root_dir.join("scripts")
    }

    /// The host's managed-libraries directory.
    pub fn managed_libs_dir(&self) -> PathBuf {
        self.managed_libs
            .clone()
            .unwrap_or_else(|| self.root_dir.join("managed"))
    }

    /// The framework's own library directory.
    pub fn framework_libs_dir(&self) -> PathBuf {
        self.framework_libs
            .clone()
            .unwrap_or_else(|| self.root_dir.join("framework"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_a_file() {
        let cfg = HostConfig::load(None).unwrap();

        assert_eq!(cfg.root_dir, PathBuf::from("."));
        assert!(!cfg.reload.load_on_start);
        assert_eq!(cfg.reload.reload_key, Key::F6);
        assert_eq!(cfg.scripts_dir(), PathBuf::from("./scripts"));
        assert_eq!(cfg.managed_libs_dir(), PathBuf::from("./managed"));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
root_dir = "/opt/host"
managed_libs = "/opt/host/Managed"

[reload]
load_on_start = true
reload_key = "F5"
"#
        )
        .unwrap();

        let cfg = HostConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.root_dir, PathBuf::from("/opt/host"));
        assert_eq!(cfg.scripts_dir(), PathBuf::from("/opt/host/scripts"));
        assert_eq!(cfg.managed_libs_dir(), PathBuf::from("/opt/host/Managed"));
        assert_eq!(cfg.framework_libs_dir(), PathBuf::from("/opt/host/framework"));
        assert!(cfg.reload.load_on_start);
        assert_eq!(cfg.reload.reload_key, Key::F5);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(HostConfig::load(Some(&missing)).is_err());
    }
}
