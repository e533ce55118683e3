use std::time::Duration;

use mailqueue_common::config::{ConfigError, StorageRetryConfig};
use serde::Deserialize;

use crate::types::QueueLayout;

const fn default_bucket_count() -> u32 {
    1
}

const fn default_slice_width_secs() -> u64 {
    3600 // 1 hour
}

const fn default_update_browse_start_pace() -> u32 {
    1000
}

/// Configuration of a [`MailQueueView`](crate::MailQueueView)
///
/// # Examples
///
/// ```ron
/// (
///     bucket_count: 4,
///     slice_width_secs: 3600,
///     browse_parallelism: Some(2),
///     retry: (max_attempts: 5),
/// )
/// ```
///
/// `bucket_count` and `slice_width_secs` form the queue layout. They are
/// recorded the first time a queue is written to and every later process
/// must be configured identically; a mismatch stops the view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MailQueueViewConfig {
    /// Number of hash buckets per queue
    ///
    /// Default: 1
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u32,

    /// Width of a time slice (in seconds)
    ///
    /// Default: 3600 seconds (1 hour)
    #[serde(default = "default_slice_width_secs")]
    pub slice_width_secs: u64,

    /// Maximum number of bucket fetches in flight while browsing one slice
    ///
    /// Default: `bucket_count`
    #[serde(default)]
    pub browse_parallelism: Option<usize>,

    /// On average one in this many completed dequeues recomputes the
    /// browse start of the queue
    ///
    /// Default: 1000
    #[serde(default = "default_update_browse_start_pace")]
    pub update_browse_start_pace: u32,

    /// Storage retry and timeout policy
    #[serde(default)]
    pub retry: StorageRetryConfig,
}

impl Default for MailQueueViewConfig {
    fn default() -> Self {
        Self {
            bucket_count: default_bucket_count(),
            slice_width_secs: default_slice_width_secs(),
            browse_parallelism: None,
            update_browse_start_pace: default_update_browse_start_pace(),
            retry: StorageRetryConfig::default(),
        }
    }
}

impl MailQueueViewConfig {
    #[must_use]
    pub const fn slice_width(&self) -> Duration {
        Duration::from_secs(self.slice_width_secs)
    }

    #[must_use]
    pub const fn layout(&self) -> QueueLayout {
        QueueLayout {
            bucket_count: self.bucket_count,
            slice_width: self.slice_width(),
        }
    }

    /// Bucket fetches allowed in flight, never more than there are buckets
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        let buckets = usize::try_from(self.bucket_count).unwrap_or(usize::MAX).max(1);
        self.browse_parallelism.unwrap_or(buckets).clamp(1, buckets)
    }

    /// # Errors
    /// If a count or width is zero, or the retry policy is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_count == 0 {
            return Err(ConfigError::NotPositive("bucket_count"));
        }

        if self.slice_width_secs == 0 {
            return Err(ConfigError::NotPositive("slice_width_secs"));
        }

        if self.browse_parallelism == Some(0) {
            return Err(ConfigError::NotPositive("browse_parallelism"));
        }

        if self.update_browse_start_pace == 0 {
            return Err(ConfigError::NotPositive("update_browse_start_pace"));
        }

        self.retry.validate()
    }
}
