//! Retry policy for storage operations.
//!
//! Storage calls are bounded by a per-attempt timeout and transient failures
//! are retried with exponential backoff and jitter:
//!
//! `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Retry and timeout policy for a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRetryConfig {
    /// Total attempts, including the first one.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    ///
    /// Default: 50
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single retry delay, in milliseconds.
    ///
    /// Default: 2000
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0). 0.2 means ±20%.
    ///
    /// Default: 0.2
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,

    /// Deadline for a single attempt, in milliseconds.
    ///
    /// Default: 5000
    #[serde(default = "defaults::operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for StorageRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
            operation_timeout_ms: defaults::operation_timeout_ms(),
        }
    }
}

impl StorageRetryConfig {
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-indexed), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = if exponent >= 63 {
            self.max_delay_ms
        } else {
            self.base_delay_ms
                .saturating_mul(1u64 << exponent)
                .min(self.max_delay_ms)
        };

        Duration::from_millis(delay)
    }

    /// # Errors
    /// If any bound is zero or the jitter factor is outside `0.0..=1.0`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::NotPositive("retry.max_attempts"));
        }

        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("retry.operation_timeout_ms"));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::OutOfRange {
                field: "retry.jitter_factor",
                reason: format!("{} is not within 0.0..=1.0", self.jitter_factor),
            });
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::OutOfRange {
                field: "retry.base_delay_ms",
                reason: format!(
                    "{} exceeds max_delay_ms ({})",
                    self.base_delay_ms, self.max_delay_ms
                ),
            });
        }

        Ok(())
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        50
    }

    pub const fn max_delay_ms() -> u64 {
        2000
    }

    pub const fn jitter_factor() -> f64 {
        0.2
    }

    pub const fn operation_timeout_ms() -> u64 {
        5000
    }
}
