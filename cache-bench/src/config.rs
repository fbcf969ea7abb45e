//! Configuration for the eviction cycle benchmark.

use l2_cache::{ElementType, L2CacheConfig};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: L2CacheConfig,
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General benchmark settings.
#[derive(Deserialize)]
pub struct GeneralConfig {
    /// Number of capture cycles to run.
    pub cycles: usize,
    /// Number of worker threads per cycle.
    pub threads: usize,
    /// Lookups each worker performs per cycle.
    pub lookups_per_cycle: usize,
}

/// Workload configuration.
#[derive(Deserialize)]
pub struct WorkloadConfig {
    /// Number of distinct row ids.
    pub keyspace: usize,
    /// Elements per row.
    pub row_width: usize,
    /// Element type of each row.
    #[serde(default)]
    pub element: ElementType,
    /// Percent of hits that write back an updated row.
    #[serde(default)]
    pub update_percent: u8,
    /// Base seed for worker RNGs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl WorkloadConfig {
    /// Bytes per row.
    pub fn row_bytes(&self) -> usize {
        self.row_width * self.element.size()
    }
}

/// Log output format.
#[derive(Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset (e.g., "info", "l2_cache=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default)]
    pub target: bool,
    #[serde(default = "default_true")]
    pub thread_names: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: false,
            thread_names: true,
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.cache.validate()?;

        if self.general.threads == 0 {
            return Err("threads must be at least 1".into());
        }
        if self.workload.keyspace == 0 {
            return Err("keyspace must be at least 1".into());
        }
        if self.workload.row_width == 0 {
            return Err("row_width must be at least 1".into());
        }
        if self.workload.update_percent > 100 {
            return Err(format!(
                "update_percent must be at most 100 (got {})",
                self.workload.update_percent
            )
            .into());
        }

        let shard_capacity = self.cache.capacity / self.cache.shards;
        if self.workload.row_bytes() > shard_capacity {
            return Err(format!(
                "rows of {} bytes do not fit in shards of {} bytes",
                self.workload.row_bytes(),
                shard_capacity
            )
            .into());
        }

        Ok(())
    }

    /// Capture slots needed per cycle. Fixed-width rows evict at most one
    /// row per put.
    pub fn max_evictions(&self) -> usize {
        self.general.threads * self.general.lookups_per_cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [general]
        cycles = 4
        threads = 2
        lookups_per_cycle = 1000

        [cache]
        capacity = "1MB"
        shards = 8
        report_interval = "1s"

        [workload]
        keyspace = 10000
        row_width = 64
        element = "half"
        update_percent = 10

        [logging]
        level = "debug"
        format = "json"
    "#;

    #[test]
    fn test_parse() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.cache.capacity, 1024 * 1024);
        assert_eq!(config.workload.element, ElementType::F16);
        assert_eq!(config.workload.row_bytes(), 128);
        assert_eq!(config.workload.seed, 42);
        assert_eq!(config.max_evictions(), 2000);
        assert!(config.logging.format == LogFormat::Json);
        assert!(config.logging.timestamps);
    }

    #[test]
    fn test_rejects_oversized_rows() {
        let text = CONFIG.replace("row_width = 64", "row_width = 100000");
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_update_percent() {
        let text = CONFIG.replace("update_percent = 10", "update_percent = 101");
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }
}
