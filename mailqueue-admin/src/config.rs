//! Administrative service configuration

use std::time::Duration;

use serde::Deserialize;

const fn default_dead_letter_timeout_ms() -> u64 {
    2000
}

/// Configuration of the administrative service
///
/// # Examples
///
/// ```ron
/// (
///     dead_letter_timeout_ms: 500,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminConfig {
    /// How long the dead-letter probe may take before the queue is reported
    /// unhealthy (in milliseconds)
    ///
    /// Default: 2000
    #[serde(default = "default_dead_letter_timeout_ms")]
    pub dead_letter_timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            dead_letter_timeout_ms: default_dead_letter_timeout_ms(),
        }
    }
}

impl AdminConfig {
    #[must_use]
    pub const fn dead_letter_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_letter_timeout_ms)
    }
}
