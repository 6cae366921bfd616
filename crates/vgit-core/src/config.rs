//! Configuration management for VGit.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// VGit configuration loaded from .git/vgit/config.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Hunk index settings.
    #[serde(default)]
    pub diff: DiffConfig,
}

impl Config {
    /// Load config from a TOML file, falling back to defaults when absent.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to a TOML file.
    ///
    /// # Errors
    /// Returns error if serialization or write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::other(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// General VGit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Remote that `push` publishes to.
    #[serde(default = "default_remote")]
    pub default_remote: String,

    /// How long a mutating command waits for the repository lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Prefix for branches created implicitly by the first claim.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

impl GeneralConfig {
    /// Lock timeout as a [`Duration`].
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_remote: default_remote(),
            lock_timeout_ms: default_lock_timeout_ms(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

fn default_remote() -> String {
    "origin".into()
}

const fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_branch_prefix() -> String {
    "virtual".into()
}

/// Hunk index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Leading bytes scanned for NUL when deciding a file is binary.
    #[serde(default = "default_binary_probe_bytes")]
    pub binary_probe_bytes: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            binary_probe_bytes: default_binary_probe_bytes(),
        }
    }
}

const fn default_binary_probe_bytes() -> usize {
    8000
}
