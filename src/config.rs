//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file; every field has a sensible default
//! so a missing or partial file still yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub backup: BackupOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Tuning knobs for a backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Maximum concurrent content-hash classifications
    #[serde(default = "default_hash_concurrency")]
    pub max_hash_concurrency: usize,

    /// Maximum concurrent file-system operations per phase
    #[serde(default = "default_file_io_concurrency")]
    pub max_file_io_concurrency: usize,

    /// Skip entries that cannot be read during enumeration instead of
    /// failing the whole run
    #[serde(default = "default_skip_inaccessible")]
    pub skip_inaccessible: bool,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_hash_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(2, 16)
}

fn default_file_io_concurrency() -> usize {
    4
}

fn default_skip_inaccessible() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            max_hash_concurrency: default_hash_concurrency(),
            max_file_io_concurrency: default_file_io_concurrency(),
            skip_inaccessible: default_skip_inaccessible(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BackupOptions::default();
        assert!(options.max_hash_concurrency >= 2);
        assert!(options.max_hash_concurrency <= 16);
        assert_eq!(options.max_file_io_concurrency, 4);
        assert!(options.skip_inaccessible);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("[backup]\nmax_file_io_concurrency = 2\n").unwrap();
        assert_eq!(config.backup.max_file_io_concurrency, 2);
        assert!(config.backup.max_hash_concurrency >= 2);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backup.max_file_io_concurrency, 4);
    }
}
