//! Error types for the mailqueue-view crate.
//!
//! Three layers:
//! - [`StoreError`]: a single storage call failed
//! - [`ViewError`]: a view operation failed after retries, or hit a fatal
//!   layout mismatch, or only partially succeeded
//! - [`QueueError`]: the transport + view composition failed

use std::time::Duration;

use mailqueue_common::config::ConfigError;
use thiserror::Error;

use crate::{
    browse::BrowseReport,
    queue::TransportError,
    slice::Slice,
    types::{MailKey, MailQueueName, QueueLayout},
};

/// Failure of one call at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Storage could not be reached or refused the request; worth retrying.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured deadline.
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Persisted data could not be interpreted.
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Returns `true` if the call may succeed when repeated.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Failure of a [`MailQueueView`](crate::MailQueueView) operation.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Storage kept failing after the retry budget was spent.
    #[error("Storage unavailable during {operation}: {source}")]
    StorageUnavailable {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Storage returned a non-transient failure.
    #[error("Storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Some partitions could not be read. Carries everything that was.
    #[error(
        "Partial browse: {} mail(s) read, {} partition(s) failed",
        .0.mails.len(),
        .0.failures.len()
    )]
    PartialBrowse(BrowseReport),

    /// The configured layout disagrees with the one persisted for the queue.
    #[error("Bucket layout mismatch for queue {queue}: persisted {persisted}, configured {configured}")]
    BucketLayoutMismatch {
        queue: MailQueueName,
        persisted: QueueLayout,
        configured: QueueLayout,
    },

    /// The mail was stored in a slice the browse start has already passed,
    /// so no browse will ever reach it.
    #[error("Mail {key} in queue {queue} was indexed at {slice}, behind the browse start {browse_start}")]
    BehindBrowseStart {
        queue: MailQueueName,
        key: MailKey,
        slice: Slice,
        browse_start: Slice,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl ViewError {
    /// Wrap the final error of a storage call
    pub(crate) fn storage(operation: &'static str, source: StoreError) -> Self {
        if source.is_transient() {
            Self::StorageUnavailable { operation, source }
        } else {
            Self::Storage { operation, source }
        }
    }

    /// Returns `true` if repeating the whole operation may succeed.
    ///
    /// Layout mismatches and configuration errors never do. Indexing behind
    /// the browse start lands in a later slice when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::PartialBrowse(_) | Self::BehindBrowseStart { .. }
        )
    }

    /// Returns `true` if the operation must not be continued or reconciled.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BucketLayoutMismatch { .. } | Self::Configuration(_)
        )
    }
}

/// Failure of a [`ViewedMailQueue`](crate::ViewedMailQueue) operation.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport accepted or released the mail but the view was not
    /// updated. The mail is still delivered, but browsing is out of date.
    #[error("Failed to index mail {key}: {source}")]
    Indexing {
        key: MailKey,
        #[source]
        source: ViewError,
    },

    #[error(transparent)]
    View(#[from] ViewError),
}

/// Specialized `Result` type for storage calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Specialized `Result` type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;
