//! Runtime settings: which configuration files to evaluate and where to look
//! for modules.
//!
//! Precedence, highest first: command-line flags (or their `ESSH_*`
//! environment variables), a JSON settings file, built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-directory configuration file.
pub const CONFIG_FILE: &str = "esshconfig.lua";

/// Evaluated after [`CONFIG_FILE`] so its definitions take precedence.
pub const OVERRIDE_CONFIG_FILE: &str = "esshconfig_override.lua";

/// Per-user directory, relative to `$HOME`.
pub const USER_DIR: &str = ".essh";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Configuration scripts, evaluated in order
    pub config_files: Vec<PathBuf>,
    /// Roots searched for `<name>/index.lua` on `essh.require`
    pub module_paths: Vec<PathBuf>,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl Settings {
    /// Built-in defaults relative to `cwd` and the user's `home`.
    pub fn defaults(cwd: &Path, home: Option<&Path>) -> Self {
        let mut config_files = Vec::new();
        let mut module_paths = vec![cwd.join(USER_DIR).join("modules")];
        if let Some(home) = home {
            config_files.push(home.join(USER_DIR).join("config.lua"));
            module_paths.push(home.join(USER_DIR).join("modules"));
        }
        config_files.push(cwd.join(CONFIG_FILE));
        config_files.push(cwd.join(OVERRIDE_CONFIG_FILE));

        Self {
            config_files,
            module_paths,
            log_filter: None,
        }
    }

    /// Load settings from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path.as_ref()))?;

        let settings: Self =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        Ok(settings)
    }

    /// Save settings to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize settings to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write settings to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Layer `other` on top of `self`; non-empty fields of `other` win.
    pub fn merge(mut self, other: Settings) -> Self {
        if !other.config_files.is_empty() {
            self.config_files = other.config_files;
        }
        if !other.module_paths.is_empty() {
            self.module_paths = other.module_paths;
        }
        if other.log_filter.is_some() {
            self.log_filter = other.log_filter;
        }
        self
    }

    /// Configuration files that exist on disk, in evaluation order.
    pub fn existing_config_files(&self) -> Vec<PathBuf> {
        self.config_files
            .iter()
            .filter(|p| p.is_file())
            .cloned()
            .collect()
    }
}
