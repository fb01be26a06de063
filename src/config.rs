//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - basalt.toml (default configuration)
//! - basalt.local.toml (git-ignored local overrides)
//! - Environment variables (BASALT_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # basalt.toml
//! [execution]
//! vector_size = 2048
//! worker_threads = 0
//! parallel_execution = true
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! BASALT_EXECUTION__VECTOR_SIZE=4096
//! BASALT_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Execution engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Tuples per scan vector
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// Number of worker threads for parallel query execution
    /// 0 = use all available CPU cores
    #[serde(default)]
    pub worker_threads: usize,

    /// Honor parallel hints in plans
    #[serde(default = "default_true")]
    pub parallel_execution: bool,

    /// Tuples per flushed output batch
    #[serde(default = "default_output_batch_size")]
    pub output_batch_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            vector_size: default_vector_size(),
            worker_threads: 0,
            parallel_execution: true,
            output_batch_size: default_output_batch_size(),
        }
    }
}

impl ExecutionConfig {
    /// The worker pool size this configuration resolves to.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level() }
    }
}

// Default value functions
fn default_vector_size() -> usize {
    2048
}
fn default_output_batch_size() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. basalt.toml (base configuration)
    /// 2. basalt.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (BASALT_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("basalt.toml"))
            .merge(Toml::file("basalt.local.toml"))
            .merge(Env::prefixed("BASALT_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BASALT_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.execution.vector_size, 2048);
        assert_eq!(config.execution.worker_threads, 0);
        assert!(config.execution.parallel_execution);
        assert_eq!(config.logging.level, "info");
        assert!(config.execution.resolved_worker_threads() >= 1);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("basalt.toml");
        std::fs::write(
            &path,
            "[execution]\nvector_size = 512\nworker_threads = 3\n\n[logging]\nlevel = \"debug\"\n",
        )
        .expect("write config");

        let config = Config::from_file(path.to_str().expect("utf8 path")).expect("load");
        assert_eq!(config.execution.vector_size, 512);
        assert_eq!(config.execution.worker_threads, 3);
        assert_eq!(config.execution.resolved_worker_threads(), 3);
        assert_eq!(config.logging.level, "debug");
        // untouched fields keep their defaults
        assert_eq!(config.execution.output_batch_size, 256);
    }
}
