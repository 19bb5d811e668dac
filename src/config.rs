//! Configuration file support (`runbook.toml`).
//!
//! CLI flags always win; the config file supplies defaults for the flags
//! the user did not pass. Looked up as `./runbook.toml`, then
//! `~/.config/runbook/runbook.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub privilege_escalation: PrivilegeEscalation,
    #[serde(default)]
    pub colors: Colors,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Default forks when `-f` is not given
    #[serde(default = "default_forks")]
    pub forks: usize,
    /// Default inventory path when `-i` is not given
    #[serde(default)]
    pub inventory: Option<String>,
    /// Default remote command timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// SSH host key checking default
    #[serde(default = "default_true")]
    pub host_key_checking: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            forks: default_forks(),
            inventory: None,
            timeout: default_timeout(),
            host_key_checking: true,
        }
    }
}

/// `[privilege_escalation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegeEscalation {
    #[serde(default)]
    pub r#become: bool,
    #[serde(default = "default_become_method")]
    pub become_method: String,
    #[serde(default = "default_become_user")]
    pub become_user: String,
}

impl Default for PrivilegeEscalation {
    fn default() -> Self {
        Self {
            r#become: false,
            become_method: default_become_method(),
            become_user: default_become_user(),
        }
    }
}

/// `[colors]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Colors {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for Colors {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_forks() -> usize {
    5
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_become_method() -> String {
    "sudo".to_string()
}
fn default_become_user() -> String {
    "root".to_string()
}

impl Config {
    /// Loads configuration from an explicit path, or from the default
    /// locations; absent files yield the built-in defaults.
    pub fn load(explicit: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in Self::default_locations() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("runbook.toml")];
        if let Some(home) = std::env::var_os("HOME") {
            locations.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("runbook")
                    .join("runbook.toml"),
            );
        }
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.defaults.forks, 5);
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.defaults.host_key_checking);
        assert_eq!(config.privilege_escalation.become_method, "sudo");
        assert!(config.colors.enabled);
    }

    #[test]
    fn parse_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runbook.toml");
        std::fs::write(&path, "[defaults]\nforks = 20\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.defaults.forks, 20);
        // untouched sections keep their defaults
        assert_eq!(config.defaults.timeout, 30);
    }

    #[test]
    fn invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runbook.toml");
        std::fs::write(&path, "not toml [").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
