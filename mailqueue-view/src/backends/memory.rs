use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet, mapref::entry::Entry};

use crate::{
    bucket::BucketId,
    error::StoreResult,
    slice::Slice,
    store::{BrowseCursorStore, DeletionIndex, EnqueuedMailStore, LayoutStore},
    types::{EnqueuedMail, MailKey, MailQueueName, QueueLayout},
};

type PartitionKey = (MailQueueName, BucketId, Slice);

/// In-memory implementation of every storage relation
///
/// Each relation is a `DashMap`; the conditional writes (set-if-absent,
/// forward-only advance) are performed under the shard lock of the entry API,
/// which gives them the same atomicity a lightweight transaction gives them
/// in an external store. Clones share the same data, so a clone handed to
/// another task behaves like another process connected to the same cluster.
///
/// # Performance
/// - Insert: O(log n) in the partition
/// - Fetch: O(n) in the partition (records are cloned out)
/// - Cursor / deletion / layout: O(1)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    mails: Arc<DashMap<PartitionKey, BTreeMap<MailKey, EnqueuedMail>>>,
    cursors: Arc<DashMap<MailQueueName, Slice>>,
    deletions: Arc<DashSet<(MailQueueName, MailKey)>>,
    layouts: Arc<DashMap<MailQueueName, QueueLayout>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored mail records, deleted or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.mails.iter().map(|partition| partition.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty `(queue, bucket, slice)` partitions
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.mails.len()
    }

    /// Number of deletion markers across all queues
    #[must_use]
    pub fn deletion_count(&self) -> usize {
        self.deletions.len()
    }
}

#[async_trait]
impl EnqueuedMailStore for MemoryStore {
    async fn insert(&self, mail: &EnqueuedMail) -> StoreResult<()> {
        self.mails
            .entry((mail.queue.clone(), mail.bucket, mail.slice))
            .or_default()
            .insert(mail.key.clone(), mail.clone());

        Ok(())
    }

    async fn fetch(
        &self,
        queue: &MailQueueName,
        bucket: BucketId,
        slice: Slice,
    ) -> StoreResult<Vec<EnqueuedMail>> {
        Ok(self
            .mails
            .get(&(queue.clone(), bucket, slice))
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BrowseCursorStore for MemoryStore {
    async fn get(&self, queue: &MailQueueName) -> StoreResult<Option<Slice>> {
        Ok(self.cursors.get(queue).map(|cursor| *cursor))
    }

    async fn initialize_if_absent(&self, queue: &MailQueueName, slice: Slice) -> StoreResult<Slice> {
        Ok(*self.cursors.entry(queue.clone()).or_insert(slice))
    }

    async fn advance(&self, queue: &MailQueueName, slice: Slice) -> StoreResult<bool> {
        match self.cursors.entry(queue.clone()) {
            Entry::Occupied(mut current) if *current.get() < slice => {
                current.insert(slice);
                Ok(true)
            }
            Entry::Occupied(_) | Entry::Vacant(_) => Ok(false),
        }
    }
}

#[async_trait]
impl DeletionIndex for MemoryStore {
    async fn mark_deleted(&self, queue: &MailQueueName, key: &MailKey) -> StoreResult<()> {
        self.deletions.insert((queue.clone(), key.clone()));
        Ok(())
    }

    async fn is_deleted(&self, queue: &MailQueueName, key: &MailKey) -> StoreResult<bool> {
        Ok(self.deletions.contains(&(queue.clone(), key.clone())))
    }
}

#[async_trait]
impl LayoutStore for MemoryStore {
    async fn register(&self, queue: &MailQueueName, layout: QueueLayout) -> StoreResult<QueueLayout> {
        Ok(*self.layouts.entry(queue.clone()).or_insert(layout))
    }

    async fn get(&self, queue: &MailQueueName) -> StoreResult<Option<QueueLayout>> {
        Ok(self.layouts.get(queue).map(|layout| *layout))
    }

    async fn queues(&self) -> StoreResult<Vec<MailQueueName>> {
        let mut queues: Vec<_> = self.layouts.iter().map(|entry| entry.key().clone()).collect();
        queues.sort();
        Ok(queues)
    }
}
