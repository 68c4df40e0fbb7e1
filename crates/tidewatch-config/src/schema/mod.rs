//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::ConfigLoader;

mod schema_extraction;
mod schema_orchestrator;

pub use schema_extraction::*;
pub use schema_orchestrator::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding job stores, the mod cache and logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            extraction: ExtractionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.data_dir))
    }

    /// Directory holding one JSON file per job store.
    pub fn jobs_path(&self) -> PathBuf {
        self.data_path().join("jobs")
    }

    /// SQLite file backing the mod metadata cache.
    pub fn mod_cache_path(&self) -> PathBuf {
        let configured = PathBuf::from(ConfigLoader::expand_path(&self.extraction.cache_file));
        if configured.is_absolute() {
            configured
        } else {
            self.data_path().join(configured)
        }
    }

    /// Log directory, defaulting to `<data_dir>/logs`.
    pub fn log_path(&self) -> PathBuf {
        match &self.logging.dir {
            Some(dir) => PathBuf::from(ConfigLoader::expand_path(dir)),
            None => self.data_path().join("logs"),
        }
    }
}

fn default_data_dir() -> String {
    dirs::home_dir()
        .map(|h| h.join(".tidewatch").to_string_lossy().to_string())
        .unwrap_or_else(|| "/data".to_string())
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Job scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the timer checks for due jobs.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Maximum number of jobs firing concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Store used when a request names none.
    #[serde(default = "default_store")]
    pub default_store: String,

    /// Store holding the built-in prune and self-update jobs.
    #[serde(default = "default_system_store")]
    pub system_store: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            max_workers: default_max_workers(),
            default_store: default_store(),
            system_store: default_system_store(),
        }
    }
}

fn default_check_interval() -> u64 {
    1
}

fn default_max_workers() -> u32 {
    4
}

fn default_store() -> String {
    "default".to_string()
}

fn default_system_store() -> String {
    "system".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (default: `<data_dir>/logs`).
    #[serde(default)]
    pub dir: Option<String>,

    /// Write the file log as JSON lines.
    #[serde(default)]
    pub json: bool,

    /// Number of daily log files kept.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    30
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
