//! PostPilot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub campaigns: CampaignConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load config from the default path (~/.postpilot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::EngineError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::EngineError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EngineError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the PostPilot home directory (~/.postpilot).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".postpilot")
    }
}

/// Scheduler engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum tasks executing at once. A full tick is skipped entirely
    /// when this many tasks are already in flight.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Default execution window (seconds) for tasks that don't set one.
    #[serde(default = "default_execution_window")]
    pub default_execution_window_secs: i64,
    /// Default retry budget for tasks that don't set one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Grace period (seconds) to wait for in-flight executions on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// When true, adapter-reported failures (success=false results) go
    /// through the retry path like adapter errors do. Off by default:
    /// the upstream behavior treats reported failures as terminal.
    #[serde(default)]
    pub retry_reported_failures: bool,
}

fn default_poll_interval_ms() -> u64 { 60_000 }
fn default_max_concurrent() -> usize { 5 }
fn default_execution_window() -> i64 { 300 }
fn default_max_retries() -> u32 { 3 }
fn default_shutdown_grace() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent: default_max_concurrent(),
            default_execution_window_secs: default_execution_window(),
            default_max_retries: default_max_retries(),
            shutdown_grace_secs: default_shutdown_grace(),
            retry_reported_failures: false,
        }
    }
}

/// DM campaign configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Sends per hour allowed per (campaign, platform) when a campaign
    /// doesn't set its own throttle.
    #[serde(default = "default_throttle_rate")]
    pub default_throttle_rate: u32,
}

fn default_throttle_rate() -> u32 { 20 }

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            default_throttle_rate: default_throttle_rate(),
        }
    }
}

/// Storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite databases.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    EngineConfig::home_dir().join("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scheduler.max_concurrent, 5);
        assert_eq!(config.scheduler.default_execution_window_secs, 300);
        assert_eq!(config.scheduler.default_max_retries, 3);
        assert!(!config.scheduler.retry_reported_failures);
    }

    #[test]
    fn test_partial_toml() {
        let config: EngineConfig = toml::from_str(
            "[scheduler]\nmax_concurrent = 2\npoll_interval_ms = 500\n",
        )
        .unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.poll_interval_ms, 500);
        // Untouched sections keep their defaults
        assert_eq!(config.campaigns.default_throttle_rate, 20);
    }
}
