use std::{sync::Arc, time::Duration, time::SystemTime};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{bucket::BucketId, slice::Slice};

/// Identifier of one logical queue instance (e.g. `spool`, `outgoing`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailQueueName(Arc<str>);

impl MailQueueName {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MailQueueName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MailQueueName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl std::fmt::Display for MailQueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifying key of a mail.
///
/// Keys are produced by whoever builds the mail. Two distinct mails sharing a
/// key land in the same bucket and overwrite each other's record, so this
/// type makes no uniqueness promise of its own. [`MailKey::generate`] returns
/// a ULID, which is unique and sortable by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailKey(Arc<str>);

impl MailKey {
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Generate a new unique key
    #[must_use]
    pub fn generate() -> Self {
        Self::new(ulid::Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for MailKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MailKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl std::fmt::Display for MailKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to the stored mail content (blob ids, spool path, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(Arc<str>);

impl PayloadRef {
    #[must_use]
    pub fn new(reference: impl AsRef<str>) -> Self {
        Self(Arc::from(reference.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Envelope information surfaced to operators when browsing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MailMetadata {
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    /// Size of the content in bytes
    pub size: u64,
    /// Free-form attributes (remote host, error message, ...)
    pub attributes: AHashMap<String, String>,
}

/// A mail as handed to the queue: key, content reference, envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    pub key: MailKey,
    pub payload: PayloadRef,
    pub metadata: MailMetadata,
}

impl Mail {
    #[must_use]
    pub fn new(key: impl Into<MailKey>, payload: PayloadRef) -> Self {
        Self {
            key: key.into(),
            payload,
            metadata: MailMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.metadata.sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.metadata.recipients.push(recipient.into());
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.metadata.size = size;
        self
    }
}

/// The indexed record of one enqueued mail.
///
/// Primary key is `(queue, bucket, slice, key)`. Records are written once and
/// never mutated; deletion only hides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueuedMail {
    pub key: MailKey,
    pub queue: MailQueueName,
    pub bucket: BucketId,
    pub slice: Slice,
    pub enqueued_at: SystemTime,
    pub payload: PayloadRef,
    pub metadata: MailMetadata,
}

/// The partitioning parameters of a queue.
///
/// These must never change for a queue once mail has been indexed: a
/// different bucket count sends existing keys to different partitions and a
/// different width misaligns every persisted slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueLayout {
    pub bucket_count: u32,
    pub slice_width: Duration,
}

impl std::fmt::Display for QueueLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buckets x {}s slices",
            self.bucket_count,
            self.slice_width.as_secs()
        )
    }
}

/// Selects mails for bulk deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailFilter {
    /// Every visible mail
    All,
    Key(MailKey),
    Sender(String),
    /// Any recipient matches
    Recipient(String),
}

impl MailFilter {
    #[must_use]
    pub fn matches(&self, mail: &EnqueuedMail) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => &mail.key == key,
            Self::Sender(sender) => mail.metadata.sender.as_deref() == Some(sender.as_str()),
            Self::Recipient(recipient) => mail.metadata.recipients.iter().any(|r| r == recipient),
        }
    }
}
