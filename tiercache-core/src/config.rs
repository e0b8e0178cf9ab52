//! Configuration management for TierCache
//!
//! This module provides:
//! - TOML configuration files with defaults for every missing field
//! - Configuration validation
//! - Environment lookup for the shared default instance

use crate::cache::eviction::EvictionPolicy;
use crate::error::{CacheError, CacheResult};
use crate::monitoring::logging::LoggingConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming a TOML file for the shared instance
pub const CONFIG_ENV_VAR: &str = "TIERCACHE_CONFIG";

/// TierCache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the `<name>.sqlite` files
    pub base_dir: PathBuf,
    /// Memory overlay settings
    pub overlay: OverlaySettings,
    /// Persistent store settings
    pub storage: StorageSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Maximum number of decoded values kept in memory (0 disables the overlay)
    pub capacity: usize,
    /// Victim selection once the capacity is exceeded
    pub eviction_policy: EvictionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite `synchronous` pragma
    pub synchronous: SyncMode,
    /// Use the write-ahead journal
    pub journal_wal: bool,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Store operations slower than this are logged
    pub slow_op_threshold_ms: u64,
    /// Payloads at least this large are zstd-compressed (None disables compression)
    pub compression_threshold_bytes: Option<usize>,
    /// zstd level used when compressing
    pub compression_level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Off,
    Normal,
    Full,
}

impl SyncMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SyncMode::Off => "OFF",
            SyncMode::Normal => "NORMAL",
            SyncMode::Full => "FULL",
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("tiercache"),
            overlay: OverlaySettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            eviction_policy: EvictionPolicy::LRU,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            synchronous: SyncMode::Normal,
            journal_wal: true,
            busy_timeout_ms: 5000,
            slow_op_threshold_ms: 100,
            compression_threshold_bytes: Some(64 * 1024), // 64 KB
            compression_level: 3,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Load the file named by `TIERCACHE_CONFIG`, or fall back to defaults
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                info!("Loading cache configuration from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig("base_dir must not be empty".to_string()));
        }

        if !(1..=22).contains(&self.storage.compression_level) {
            return Err(CacheError::InvalidConfig(format!(
                "compression_level must be between 1 and 22, got {}",
                self.storage.compression_level
            )));
        }

        if self.storage.compression_threshold_bytes == Some(0) {
            return Err(CacheError::InvalidConfig(
                "compression_threshold_bytes must be positive; omit it to disable compression"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
