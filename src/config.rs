// Configuration File Support
//
// TOML configuration for the taskgate binary and for embedders that want
// file-driven queue and limiter settings. Environment variables prefixed
// with TASKGATE_ override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::queue::QueueConfig;
use crate::rate_limit::RateLimiterConfig;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "taskgate.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Task queue configuration
    pub queue: QueueConfig,

    /// Rate limiter configuration
    pub rate_limit: RateLimiterConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to register collectors and print the exposition at exit
    pub enabled: bool,
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the resulting configuration is invalid. If the config file does not
    /// exist, defaults (plus environment overrides) are used.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - TASKGATE_LOG_LEVEL
    /// - TASKGATE_LOG_FORMAT
    /// - TASKGATE_QUEUE_NAME
    /// - TASKGATE_DRAIN_TIMEOUT_SECS
    /// - TASKGATE_RATE_LIMIT_IDLE_GRACE_SECS
    /// - TASKGATE_RATE_LIMIT_SWEEP_INTERVAL_SECS
    /// - TASKGATE_METRICS_ENABLED
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Numeric values that fail to parse are ignored.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(level) = lookup("TASKGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TASKGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Queue overrides
        if let Some(name) = lookup("TASKGATE_QUEUE_NAME") {
            if !name.is_empty() {
                self.queue.name = name;
            }
        }
        if let Some(secs) = lookup("TASKGATE_DRAIN_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.queue.drain_timeout_secs = secs;
            }
        }

        // Rate limit overrides
        if let Some(secs) = lookup("TASKGATE_RATE_LIMIT_IDLE_GRACE_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.rate_limit.idle_grace_secs = secs;
            }
        }
        if let Some(secs) = lookup("TASKGATE_RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                if secs > 0 {
                    self.rate_limit.sweep_interval_secs = secs;
                }
            }
        }

        // Metrics overrides
        if let Some(enabled) = lookup("TASKGATE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.queue.name.is_empty() {
            anyhow::bail!("Queue name must not be empty");
        }

        self.rate_limit
            .validate()
            .context("Invalid [rate_limit] section")?;

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
