//! Storage seams of the view.
//!
//! The persisted layout is one logical keyspace with four relations:
//!
//! | relation                              | value          |
//! |---------------------------------------|----------------|
//! | `(queue, bucket, slice_start, key)`   | `EnqueuedMail` |
//! | `(queue)`                             | earliest slice |
//! | `(queue, key)`                        | present        |
//! | `(queue)`                             | `QueueLayout`  |
//!
//! Any store with prefix range scans, point reads and conditional writes
//! (set-if-absent, forward-only compare-and-set) can implement them. No
//! implementation may rely on a process-wide lock: several processes share
//! the same store.

use async_trait::async_trait;

use crate::{
    bucket::BucketId,
    error::StoreResult,
    slice::Slice,
    types::{EnqueuedMail, MailKey, MailQueueName, QueueLayout},
};

/// Per-partition mail records
#[async_trait]
pub trait EnqueuedMailStore: Send + Sync + std::fmt::Debug {
    /// Write a record, overwriting any record with the same primary key.
    ///
    /// Must be idempotent so that callers can retry freely.
    async fn insert(&self, mail: &EnqueuedMail) -> StoreResult<()>;

    /// Every record of one `(queue, bucket, slice)` partition, in storage order
    async fn fetch(
        &self,
        queue: &MailQueueName,
        bucket: BucketId,
        slice: Slice,
    ) -> StoreResult<Vec<EnqueuedMail>>;
}

/// Per-queue monotonic browse cursor
#[async_trait]
pub trait BrowseCursorStore: Send + Sync + std::fmt::Debug {
    /// The earliest slice that may still hold visible mail.
    ///
    /// `None` means the queue has never been written to.
    async fn get(&self, queue: &MailQueueName) -> StoreResult<Option<Slice>>;

    /// Set the cursor if the queue has none yet.
    ///
    /// Returns the committed value, which is `slice` only for the first
    /// writer. Losing writers do not fail.
    async fn initialize_if_absent(&self, queue: &MailQueueName, slice: Slice) -> StoreResult<Slice>;

    /// Move the cursor to `slice` if that is later than the current value.
    ///
    /// Returns `true` if the cursor moved. Never moves it backwards, and
    /// never creates a cursor for a queue that has none.
    async fn advance(&self, queue: &MailQueueName, slice: Slice) -> StoreResult<bool>;
}

/// Per-queue set of logically deleted keys.
///
/// There is deliberately no removal operation; reclaiming markers belongs to
/// the retention job that also drops fully elapsed partitions.
#[async_trait]
pub trait DeletionIndex: Send + Sync + std::fmt::Debug {
    /// Idempotent add
    async fn mark_deleted(&self, queue: &MailQueueName, key: &MailKey) -> StoreResult<()>;

    async fn is_deleted(&self, queue: &MailQueueName, key: &MailKey) -> StoreResult<bool>;
}

/// Per-queue partitioning layout, also the registry of known queues
#[async_trait]
pub trait LayoutStore: Send + Sync + std::fmt::Debug {
    /// Persist `layout` unless one is already recorded; return the committed one.
    async fn register(&self, queue: &MailQueueName, layout: QueueLayout) -> StoreResult<QueueLayout>;

    async fn get(&self, queue: &MailQueueName) -> StoreResult<Option<QueueLayout>>;

    /// Every queue with a recorded layout
    async fn queues(&self) -> StoreResult<Vec<MailQueueName>>;
}

/// A single backend implementing every relation
pub trait ViewStore:
    EnqueuedMailStore + BrowseCursorStore + DeletionIndex + LayoutStore + 'static
{
}

impl<T> ViewStore for T where
    T: EnqueuedMailStore + BrowseCursorStore + DeletionIndex + LayoutStore + 'static
{
}
