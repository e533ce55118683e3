//! Administrative error types

use mailqueue_view::{MailQueueName, ViewError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    /// No mail was ever indexed for this queue
    #[error("Unknown queue {0}")]
    QueueUnknown(MailQueueName),

    #[error(transparent)]
    View(#[from] ViewError),
}

impl AdminError {
    /// Returns `true` if repeating the request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::QueueUnknown(_) => false,
            Self::View(err) => err.is_retryable(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
