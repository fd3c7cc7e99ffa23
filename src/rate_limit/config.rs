//! Rate Limit Configuration
//!
//! Limits are chosen by the caller per call site. This module holds the
//! validated [`RateLimit`] type, named policies loadable from a config file,
//! and the limiter's housekeeping settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::error::RateLimitError;

/// Default API policy: requests per minute
pub const DEFAULT_API_RATE_LIMIT: u32 = 100;

/// Default login policy: attempts per minute
pub const DEFAULT_LOGIN_RATE_LIMIT: u32 = 5;

/// Buckets idle for this long (and empty) are removed by a sweep
pub const DEFAULT_IDLE_GRACE_SECS: u64 = 300;

/// Interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Key count at which inserting a new key triggers an inline sweep
pub const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

/// A validated limit: at most `max_requests` permitted actions within any
/// trailing `window`.
///
/// A zero `max_requests` never permits anything. A zero `window` keeps no
/// history, so every check is permitted unless `max_requests` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
}

impl RateLimit {
    /// Create a limit from already-valid values
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Validate raw, possibly negative, caller input.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidArgument`] when `max_requests` or
    /// `window` is negative, or `max_requests` exceeds `u32::MAX`.
    pub fn try_new(max_requests: i64, window: chrono::Duration) -> Result<Self, RateLimitError> {
        if max_requests < 0 {
            return Err(RateLimitError::InvalidArgument(format!(
                "max_requests must be non-negative, got {}",
                max_requests
            )));
        }
        let max_requests = u32::try_from(max_requests).map_err(|_| {
            RateLimitError::InvalidArgument(format!(
                "max_requests must be at most {}, got {}",
                u32::MAX,
                max_requests
            ))
        })?;
        let window = window.to_std().map_err(|_| {
            RateLimitError::InvalidArgument(format!(
                "window_duration must be non-negative, got {}ms",
                window.num_milliseconds()
            ))
        })?;

        Ok(Self::new(max_requests, window))
    }

    /// `n` actions per second
    pub const fn per_second(n: u32) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    /// `n` actions per minute
    pub const fn per_minute(n: u32) -> Self {
        Self::new(n, Duration::from_secs(60))
    }

    /// `n` actions per hour
    pub const fn per_hour(n: u32) -> Self {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Maximum permitted actions per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// A named limit as written in a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum permitted actions per window
    pub max_requests: u32,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// Convert to a [`RateLimit`]
    pub fn limit(&self) -> RateLimit {
        RateLimit::new(self.max_requests, Duration::from_millis(self.window_ms))
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Seconds an empty bucket must stay untouched before a sweep removes it
    pub idle_grace_secs: u64,

    /// Seconds between background sweeps
    pub sweep_interval_secs: u64,

    /// Key count at which inserting a new key sweeps inline
    pub sweep_threshold: usize,

    /// Named per-call-site limits
    pub policies: HashMap<String, RateLimitPolicy>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            "api".to_string(),
            RateLimitPolicy {
                max_requests: DEFAULT_API_RATE_LIMIT,
                window_ms: 60_000,
            },
        );
        policies.insert(
            "login".to_string(),
            RateLimitPolicy {
                max_requests: DEFAULT_LOGIN_RATE_LIMIT,
                window_ms: 60_000,
            },
        );

        Self {
            idle_grace_secs: DEFAULT_IDLE_GRACE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            policies,
        }
    }
}

impl RateLimiterConfig {
    /// Get idle grace period
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    /// Get sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Look up a named policy
    pub fn policy(&self, name: &str) -> Option<RateLimit> {
        self.policies.get(name).map(RateLimitPolicy::limit)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep interval or threshold is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("Rate limit sweep interval must be > 0");
        }
        if self.sweep_threshold == 0 {
            anyhow::bail!("Rate limit sweep threshold must be > 0");
        }
        Ok(())
    }
}
