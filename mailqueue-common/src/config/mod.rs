//! Configuration shared by the mailqueue crates.
//!
//! - [`retry`]: retry and timeout policy applied at the storage boundary

pub mod retry;

use thiserror::Error;

pub use retry::StorageRetryConfig;

/// A configuration value was rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value must be strictly positive.
    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),

    /// The value is outside its accepted range.
    #[error("`{field}` is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: String,
    },
}
