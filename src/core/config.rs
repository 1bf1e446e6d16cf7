//! Configuration management for hashsweep.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the local signature database inside the data directory.
pub const DATABASE_FILE: &str = "engine.db";

/// Main configuration structure.
///
/// Every path the engine touches is derived from this struct, so two engines
/// built from different configs never share state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override for the data directory (database, archives, output)
    pub data_dir: Option<PathBuf>,
    /// Scan-related settings
    pub scan: ScanConfig,
    /// Signature feed settings
    pub updates: UpdateConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Detection log output settings
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from `config_path`, writing defaults there if absent.
    pub fn load_or_default_at(config_path: &Path) -> Self {
        if config_path.exists() {
            match Self::load(config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        let config = Self::default();

        if let Err(e) = config.save(config_path) {
            log::warn!("Failed to save default config: {}", e);
        }

        config
    }

    /// Create a configuration rooted at the given data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.json")
    }

    /// Get the platform default data directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hashsweep")
    }

    /// Get the effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Path of the live signature database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE)
    }

    /// Directory that receives detection logs and summaries.
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("output"))
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_file_size_mb == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.max_file_size_mb".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.scan.workers == 0 || self.scan.workers > 512 {
            return Err(Error::ConfigInvalid {
                field: "scan.workers".to_string(),
                message: "Must be between 1 and 512".to_string(),
            });
        }

        if self.scan.extensions.is_empty() {
            return Err(Error::ConfigInvalid {
                field: "scan.extensions".to_string(),
                message: "At least one extension is required".to_string(),
            });
        }

        if self.updates.expected_entry.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "updates.expected_entry".to_string(),
                message: "Must name the database file inside the feed archive".to_string(),
            });
        }

        if self.updates.max_attempts == 0 {
            return Err(Error::ConfigInvalid {
                field: "updates.max_attempts".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Scan-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Skip files larger than this size (MiB)
    pub max_file_size_mb: u64,
    /// File suffixes eligible for hashing (with leading dot)
    pub extensions: Vec<String>,
    /// Directory names pruned from traversal
    pub exclude_dirs: Vec<String>,
    /// Number of concurrent hashing workers
    pub workers: usize,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Walk the tree once up front to get an exact progress total
    pub count_before_scan: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            extensions: [
                // executables and libraries
                ".exe", ".dll", ".sys", ".msi", ".jar",
                // scripts
                ".py", ".js", ".vbs", ".ps1", ".bat", ".cmd",
                // archives and packages
                ".zip", ".rar", ".7z", ".xapk",
                // office documents
                ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".hwp",
                // text and config
                ".xml", ".cfg", ".txt",
                // images
                ".jpg", ".jpeg", ".png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_dirs: [
                "venv", "venv2", ".venv", ".idea", "lib", ".git", "node_modules", "__pycache__",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            workers: 50,
            follow_symlinks: false,
            count_before_scan: false,
        }
    }
}

/// Signature feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// URL of the full signature export
    pub feed_url: String,
    /// Name of the database entry inside the feed archive (case-insensitive)
    pub expected_entry: String,
    /// User-Agent header sent with the feed request
    pub user_agent: String,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts for a whole refresh before giving up
    pub max_attempts: u32,
    /// Refresh automatically at scan start when the database is stale
    pub auto_update: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://bazaar.abuse.ch/export/txt/sha256/full/".to_string(),
            expected_entry: "full_sha256.txt".to_string(),
            user_agent: format!("hashsweep/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 15,
            timeout_secs: 600,
            max_attempts: 3,
            auto_update: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Detection log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Override for the output directory
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.workers, 50);
        assert_eq!(config.scan.max_file_size_mb, 100);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.scan.workers = 8;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.workers, 8);
        assert_eq!(loaded.updates.feed_url, config.updates.feed_url);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "scan": { "workers": 4 } }"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.workers, 4);
        assert_eq!(loaded.scan.max_file_size_mb, 100);
        assert_eq!(loaded.updates.expected_entry, "full_sha256.txt");
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = Config::with_data_dir("/srv/hashsweep");
        assert_eq!(config.database_path(), PathBuf::from("/srv/hashsweep/engine.db"));
        assert_eq!(config.output_dir(), PathBuf::from("/srv/hashsweep/output"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.scan.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.max_file_size_mb = 0;
        assert!(config.validate().is_err());
    }
}
