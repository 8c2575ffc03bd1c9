//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (QUIVER_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [query]
//! timeout_ms = 60000
//! max_result_rows = 0
//!
//! [kernel]
//! num_threads = 0
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUIVER_QUERY__TIMEOUT_MS=5000
//! QUIVER_KERNEL__NUM_THREADS=4
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
    pub query: QueryConfig,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-query execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum query wall-clock time in milliseconds (0 = unlimited)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Hard cap on materialized result rows (0 = unlimited)
    #[serde(default)]
    pub max_result_rows: usize,
}

/// Sparse matrix kernel tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Worker threads for intra-multiply parallelism.
    /// 0 = use all available CPU cores.
    #[serde(default)]
    pub num_threads: usize,

    /// Row count below which a multiply stays single-threaded
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_timeout_ms() -> u64 {
    60_000
}
fn default_parallel_threshold() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUIVER_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("QUIVER_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUIVER_").split("__"))
            .extract()
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            timeout_ms: default_timeout_ms(),
            max_result_rows: 0,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            num_threads: 0,
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.query.timeout_ms, 60_000);
        assert_eq!(config.query.max_result_rows, 0);
        assert_eq!(config.kernel.num_threads, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[query]"));
        assert!(toml_str.contains("[kernel]"));
    }
}
