//! Propagator configuration
//!
//! Loaded from TOML; every field has a default so partial files work.
//!
//! ```toml
//! max_attempts = 10
//! base_delay_ms = 1000
//! backoff_multiplier = 1.5
//! max_delay_ms = 30000
//! retention_secs = 7200
//! ```

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest retry delay or jitter accepted (one day)
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Longest retention or GC interval accepted (one year)
pub const MAX_RETENTION_SECS: u64 = 365 * 24 * 60 * 60;

/// Propagation queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Deferrals before a task is marked failed
    pub max_attempts: u32,
    /// First retry delay
    pub base_delay_ms: u64,
    /// Growth factor per attempt
    pub backoff_multiplier: f64,
    /// Upper bound on the retry delay (before jitter)
    pub max_delay_ms: u64,
    /// Upper bound on the random jitter added to each delay
    pub max_jitter_ms: u64,
    /// How long finished tasks are kept
    pub retention_secs: u64,
    /// How often finished tasks are purged
    pub gc_interval_secs: u64,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Spawn the worker and GC tasks; off for manual stepping
    pub auto_process: bool,
}

impl PropagationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set base delay, multiplier and cap in one go
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.base_delay_ms = duration_ms(base);
        self.backoff_multiplier = multiplier;
        self.max_delay_ms = duration_ms(max);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter_ms = duration_ms(max_jitter);
        self
    }

    /// Keep finished tasks this long; sub-second parts are dropped
    #[inline]
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    /// Purge every `interval`; sub-second parts are dropped, so anything
    /// under one second fails validation
    #[inline]
    #[must_use]
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval_secs = interval.as_secs();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_auto_process(mut self, auto_process: bool) -> Self {
        self.auto_process = auto_process;
        self
    }

    /// Backoff policy described by this config
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(Duration::from_millis(self.max_jitter_ms))
    }

    #[inline]
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    #[inline]
    #[must_use]
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    /// Check field ranges
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                format!("must be a finite value >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if self.max_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::invalid(
                "max_delay_ms",
                format!("must be at most {MAX_DELAY_MS}"),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::invalid(
                "max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }
        if self.max_jitter_ms > MAX_DELAY_MS {
            return Err(ConfigError::invalid(
                "max_jitter_ms",
                format!("must be at most {MAX_DELAY_MS}"),
            ));
        }
        if self.retention_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::invalid(
                "retention_secs",
                format!("must be at most {MAX_RETENTION_SECS}"),
            ));
        }
        if self.gc_interval_secs == 0 || self.gc_interval_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::invalid(
                "gc_interval_secs",
                format!("must be between 1 and {MAX_RETENTION_SECS}"),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be non-zero"));
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` if validation fails
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - otherwise as [`PropagationConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            backoff_multiplier: 1.5,
            max_delay_ms: 30_000,
            max_jitter_ms: 500,
            retention_secs: 2 * 60 * 60,
            gc_interval_secs: 10 * 60,
            event_capacity: 256,
            auto_process: true,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
