//! Configuration management for the frontier core
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every tunable the core recognizes lives here:
//! activation sweep interval, per-cluster worker concurrency, failure
//! backoff, revisit policy and the cluster set.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Activation sweep configuration
    pub activation: ActivationConfig,

    /// Dispatch queue configuration
    pub dispatch: DispatchConfig,

    /// Failure backoff configuration
    pub backoff: BackoffConfig,

    /// Revisit policy configuration
    pub revisit: RevisitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Activation sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Seconds between promotion sweeps
    pub sweep_interval_secs: u64,
}

/// Dispatch queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Cluster labels the scheduler assigns hosts onto
    pub clusters: Vec<String>,

    /// Download worker concurrency per cluster (consumed by the external
    /// fetcher when sizing its worker pool)
    pub workers_per_cluster: usize,
}

/// Failure backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure, in seconds
    pub base_secs: u64,

    /// Maximum retry delay, in seconds
    pub cap_secs: u64,

    /// Jitter as a fraction of the raw delay, in `[0, 1)`
    pub jitter_ratio: f64,
}

/// Revisit policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisitConfig {
    /// Interval before the first re-download, in seconds
    pub default_interval_secs: u64,

    /// Lower bound for the adaptive interval, in seconds
    pub min_interval_secs: u64,

    /// Upper bound for the adaptive interval, in seconds
    pub max_interval_secs: u64,

    /// Multiplier applied when the document hash is unchanged
    pub growth_factor: f64,

    /// Multiplier applied when the document hash changed
    pub shrink_factor: f64,

    /// Adapt the interval by change frequency; fixed interval when false
    pub adaptive: bool,
}

/// Largest accepted delay or interval, in seconds (100 years). Values
/// beyond this would overflow signed arithmetic at the scheduling boundary.
pub const MAX_DELAY_SECS: u64 = 100 * 365 * 86_400;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_u64("FRONTIER_SWEEP_INTERVAL_SECS") {
            config.activation.sweep_interval_secs = v;
        }
        if let Ok(v) = std::env::var("FRONTIER_CLUSTERS") {
            let clusters: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !clusters.is_empty() {
                config.dispatch.clusters = clusters;
            }
        }
        if let Some(v) = env_u64("FRONTIER_WORKERS_PER_CLUSTER") {
            config.dispatch.workers_per_cluster = v as usize;
        }
        if let Some(v) = env_u64("FRONTIER_BACKOFF_BASE_SECS") {
            config.backoff.base_secs = v;
        }
        if let Some(v) = env_u64("FRONTIER_BACKOFF_CAP_SECS") {
            config.backoff.cap_secs = v;
        }
        if let Some(v) = env_f64("FRONTIER_BACKOFF_JITTER") {
            config.backoff.jitter_ratio = v;
        }
        if let Some(v) = env_u64("FRONTIER_DEFAULT_REVISIT_SECS") {
            config.revisit.default_interval_secs = v;
        }
        if let Ok(v) = std::env::var("FRONTIER_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("FRONTIER_LOG_FORMAT") {
            config.logging.format = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.activation.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be greater than 0");
        }
        if self.dispatch.clusters.is_empty() {
            anyhow::bail!("at least one cluster must be configured");
        }
        if self.dispatch.workers_per_cluster == 0 {
            anyhow::bail!("workers_per_cluster must be greater than 0");
        }
        if self.backoff.base_secs == 0 {
            anyhow::bail!("backoff base_secs must be greater than 0");
        }
        if self.backoff.cap_secs < self.backoff.base_secs {
            anyhow::bail!("backoff cap_secs must be >= base_secs");
        }
        if self.backoff.cap_secs > MAX_DELAY_SECS {
            anyhow::bail!("backoff cap_secs must be <= {MAX_DELAY_SECS}");
        }
        if !(0.0..1.0).contains(&self.backoff.jitter_ratio) {
            anyhow::bail!("backoff jitter_ratio must be in [0, 1)");
        }
        if self.revisit.default_interval_secs == 0 {
            anyhow::bail!("default_interval_secs must be greater than 0");
        }
        if self.revisit.min_interval_secs > self.revisit.max_interval_secs {
            anyhow::bail!("revisit min_interval_secs must be <= max_interval_secs");
        }
        if self.revisit.max_interval_secs > MAX_DELAY_SECS
            || self.revisit.default_interval_secs > MAX_DELAY_SECS
        {
            anyhow::bail!("revisit intervals must be <= {MAX_DELAY_SECS}");
        }
        if self.revisit.growth_factor < 1.0 {
            anyhow::bail!("revisit growth_factor must be >= 1.0");
        }
        if self.revisit.shrink_factor <= 0.0 || self.revisit.shrink_factor > 1.0 {
            anyhow::bail!("revisit shrink_factor must be in (0, 1]");
        }
        Ok(())
    }

    /// Get the sweep interval as a Duration
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.activation.sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activation: ActivationConfig {
                sweep_interval_secs: 5,
            },
            dispatch: DispatchConfig {
                clusters: vec![
                    String::from("alpha"),
                    String::from("beta"),
                    String::from("gamma"),
                ],
                workers_per_cluster: 4,
            },
            backoff: BackoffConfig {
                base_secs: 30,
                cap_secs: 3600,
                jitter_ratio: 0.2,
            },
            revisit: RevisitConfig {
                default_interval_secs: 86400,
                min_interval_secs: 600,
                max_interval_secs: 604800,
                growth_factor: 2.0,
                shrink_factor: 0.5,
                adaptive: true,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}
