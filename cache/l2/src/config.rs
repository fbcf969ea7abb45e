//! Cache configuration.
//!
//! Sizes accept human-readable strings ("4GB", "512MB") and durations use
//! `humantime` syntax ("10s", "1m").
//!
//! ```toml
//! capacity = "4GB"
//! shards = 16
//! report_interval = "10s"
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for an [`L2Cache`](crate::L2Cache).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct L2CacheConfig {
    /// Total capacity in bytes, split across shards.
    #[serde(default = "default_capacity", deserialize_with = "deserialize_size")]
    pub capacity: usize,
    /// Number of independent shards.
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// How often the admin thread publishes usage.
    #[serde(
        default = "default_report_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub report_interval: Duration,
}

fn default_capacity() -> usize {
    1024 * 1024 * 1024
}

fn default_shards() -> usize {
    16
}

fn default_report_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for L2CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            shards: default_shards(),
            report_interval: default_report_interval(),
        }
    }
}

impl L2CacheConfig {
    /// Create a configuration with the default report interval.
    pub fn new(capacity: usize, shards: usize) -> Self {
        Self {
            capacity,
            shards,
            report_interval: default_report_interval(),
        }
    }

    /// Check that the capacity can be split into non-empty shards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::ZeroShards);
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.capacity < self.shards {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.capacity,
                shards: self.shards,
            });
        }
        Ok(())
    }

    /// Per-shard capacities. Remainder bytes go to the lowest shards.
    pub fn shard_capacities(&self) -> Result<Vec<usize>, ConfigError> {
        self.validate()?;
        Ok(distribute_capacity(self.capacity, self.shards))
    }
}

fn distribute_capacity(total: usize, shards: usize) -> Vec<usize> {
    let base = total / shards;
    let rem = total % shards;
    (0..shards).map(|i| base + usize::from(i < rem)).collect()
}

/// Parse a size string like "1GB", "512MB", "4KB" into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    let (num_str, suffix) = s.split_at(num_end);
    let num: f64 = num_str
        .parse()
        .map_err(|e| format!("invalid number '{}': {}", num_str, e))?;

    let multiplier: usize = match suffix.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        "TB" | "T" => 1024 * 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix '{}'", other)),
    };

    Ok((num * multiplier as f64) as usize)
}

/// Deserialize a size from a human-readable string.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_size(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a duration from a human-readable string (e.g., "10s", "1m").
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}
