use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cleaner::DeletionMode;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Persisted nuget-sweep settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Package cache root (the folder holding `packages/`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,

    /// Versions not accessed for this many days are removed
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,

    /// Move removed versions to the staging area instead of deleting them
    #[serde(default)]
    pub use_recycle_bin: bool,

    /// Extension of the package artifact inside each version folder
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

fn default_days_to_keep() -> u32 {
    7
}
fn default_artifact_extension() -> String {
    "nupkg".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: None,
            days_to_keep: default_days_to_keep(),
            use_recycle_bin: false,
            artifact_extension: default_artifact_extension(),
        }
    }
}

impl Config {
    /// Get the nuget-sweep data directory (~/.nuget-sweep)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".nuget-sweep")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the staging directory
    pub fn staging_dir() -> PathBuf {
        Self::data_dir().join("staging")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// The conventional NuGet cache location (~/.nuget)
    pub fn default_cache_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".nuget"))
    }

    /// Load config from file, or fall back to defaults if not present
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            Self::parse(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        let dir = Self::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Initialize all nuget-sweep directories
    pub fn init_dirs() -> Result<()> {
        let dirs = [Self::data_dir(), Self::staging_dir(), Self::logs_dir()];
        for dir in &dirs {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Apply a `config set` assignment
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "cache_root" => {
                self.cache_root = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "days_to_keep" => {
                self.days_to_keep = value
                    .parse()
                    .with_context(|| format!("Invalid day count: {}", value))?
            }
            "use_recycle_bin" => {
                self.use_recycle_bin = value
                    .parse()
                    .with_context(|| format!("Expected true or false, got: {}", value))?
            }
            "artifact_extension" => {
                self.artifact_extension = value.trim_start_matches('.').to_string()
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Retention window as a duration
    pub fn max_age(&self) -> Duration {
        retention_days(self.days_to_keep)
    }

    pub fn deletion_mode(&self) -> DeletionMode {
        if self.use_recycle_bin {
            DeletionMode::Recoverable
        } else {
            DeletionMode::Permanent
        }
    }
}

/// Convert a day count from the command line into a retention window
pub fn retention_days(count: u32) -> Duration {
    Duration::from_secs(u64::from(count) * SECS_PER_DAY)
}
