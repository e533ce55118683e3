//! The queue view orchestrator

use std::{future::Future, sync::Arc};

use dashmap::DashSet;
use futures_util::{
    StreamExt,
    stream::{self},
};
use mailqueue_common::{Signal, internal};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, instrument, warn};

use crate::{
    browse::{BrowseReport, BrowseState, BrowseStream, PartitionFailure, SizeReport, SliceScan},
    bucket::{BucketId, bucket_of},
    clock::{Clock, SystemClock},
    config::MailQueueViewConfig,
    error::{Result, StoreResult, ViewError},
    retry::with_retry,
    slice::{Slice, SliceCalculator},
    store::{BrowseCursorStore, DeletionIndex, EnqueuedMailStore, LayoutStore, ViewStore},
    types::{EnqueuedMail, Mail, MailFilter, MailKey, MailQueueName, QueueLayout},
};

#[derive(Debug)]
struct Inner {
    config: MailQueueViewConfig,
    layout: QueueLayout,
    parallelism: usize,
    slices: SliceCalculator,
    mails: Arc<dyn EnqueuedMailStore>,
    cursors: Arc<dyn BrowseCursorStore>,
    deletions: Arc<dyn DeletionIndex>,
    layouts: Arc<dyn LayoutStore>,
    /// Queues whose persisted layout already matched ours
    verified: DashSet<MailQueueName>,
}

/// Browsable, countable and selectively deletable view of mail queues.
///
/// Every mail handed to [`MailQueueView::enqueue`] is indexed under
/// `(queue, bucket, slice)`. Browsing starts at the per-queue browse cursor,
/// so its cost is bounded by the live tail of the queue and not by its whole
/// history. Deletion writes a marker and leaves the record in place.
///
/// Cloning is cheap; clones share stores and configuration. Several views,
/// in one process or many, may operate on the same stores concurrently.
#[derive(Debug, Clone)]
pub struct MailQueueView {
    inner: Arc<Inner>,
}

impl MailQueueView {
    /// Start building a view whose relations all live in `store`
    #[must_use]
    pub fn builder<S: ViewStore>(config: MailQueueViewConfig, store: Arc<S>) -> MailQueueViewBuilder {
        MailQueueViewBuilder {
            config,
            mails: store.clone(),
            cursors: store.clone(),
            deletions: store.clone(),
            layouts: store,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MailQueueViewConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn layout(&self) -> QueueLayout {
        self.inner.layout
    }

    #[must_use]
    pub fn slices(&self) -> &SliceCalculator {
        &self.inner.slices
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        with_retry(&self.inner.config.retry, operation, call)
            .await
            .map_err(|err| ViewError::storage(operation, err))
    }

    /// Check the persisted layout of `queue` against ours.
    ///
    /// With `register`, a queue without a layout gets ours recorded.
    async fn verify_layout(&self, queue: &MailQueueName, register: bool) -> Result<()> {
        if self.inner.verified.contains(queue) {
            return Ok(());
        }

        let configured = self.inner.layout;
        let persisted = if register {
            Some(
                self.retry("register_layout", || {
                    self.inner.layouts.register(queue, configured)
                })
                .await?,
            )
        } else {
            self.retry("get_layout", || self.inner.layouts.get(queue))
                .await?
        };

        match persisted {
            Some(persisted) if persisted != configured => {
                error!(
                    %queue,
                    %persisted,
                    %configured,
                    "Configured queue layout does not match the persisted one"
                );
                Err(ViewError::BucketLayoutMismatch {
                    queue: queue.clone(),
                    persisted,
                    configured,
                })
            }
            Some(_) => {
                self.inner.verified.insert(queue.clone());
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Index `mail` in `queue`.
    ///
    /// The record write and the browse-start initialisation run concurrently
    /// and both must succeed; any failure is returned so the caller can
    /// decide whether to retry the indexing. The browse start is read again
    /// once the record is stored: a mail whose slice it has already passed
    /// could never be browsed, and is reported as
    /// [`ViewError::BehindBrowseStart`].
    ///
    /// # Errors
    /// If either write fails after retries, the queue layout mismatches, or
    /// the mail landed behind the browse start
    #[instrument(level = "debug", skip(self, mail), fields(%queue, key = %mail.key))]
    pub async fn enqueue(&self, queue: &MailQueueName, mail: &Mail) -> Result<EnqueuedMail> {
        self.verify_layout(queue, true).await?;

        let now = self.inner.slices.now();
        let slice = self.inner.slices.slice_of(now);
        let enqueued = EnqueuedMail {
            key: mail.key.clone(),
            queue: queue.clone(),
            bucket: bucket_of(&mail.key, self.inner.layout.bucket_count),
            slice,
            enqueued_at: now,
            payload: mail.payload.clone(),
            metadata: mail.metadata.clone(),
        };

        let (stored, browse_start) = tokio::join!(
            self.retry("insert", || self.inner.mails.insert(&enqueued)),
            self.retry("initialize_browse_start", || {
                self.inner.cursors.initialize_if_absent(queue, slice)
            }),
        );
        stored?;
        Self::ensure_browsable(&enqueued, browse_start?)?;

        // A browse may have passed the slice before the record landed
        if let Some(browse_start) = self.browse_start(queue).await? {
            Self::ensure_browsable(&enqueued, browse_start)?;
        }

        internal!(
            level = DEBUG,
            "Indexed {} in bucket {} slice {}",
            enqueued.key,
            enqueued.bucket,
            enqueued.slice
        );

        Ok(enqueued)
    }

    fn ensure_browsable(enqueued: &EnqueuedMail, browse_start: Slice) -> Result<()> {
        if browse_start <= enqueued.slice {
            return Ok(());
        }

        warn!(
            queue = %enqueued.queue,
            key = %enqueued.key,
            slice = %enqueued.slice,
            %browse_start,
            "Mail was indexed behind the browse start"
        );
        Err(ViewError::BehindBrowseStart {
            queue: enqueued.queue.clone(),
            key: enqueued.key.clone(),
            slice: enqueued.slice,
            browse_start,
        })
    }

    /// The earliest slice that may hold visible mail, if the queue was ever written to
    ///
    /// # Errors
    /// If the cursor cannot be read
    pub async fn browse_start(&self, queue: &MailQueueName) -> Result<Option<Slice>> {
        self.retry("get_browse_start", || self.inner.cursors.get(queue))
            .await
    }

    /// Lazily list the visible mails of `queue`, oldest slice first.
    ///
    /// A queue that was never written to yields nothing. Partitions that
    /// cannot be read are reported in-line as [`PartitionFailure`]s while the
    /// rest of the queue is still produced.
    ///
    /// # Errors
    /// If the browse start cannot be read, or the queue layout mismatches
    #[instrument(level = "debug", skip(self), fields(%queue))]
    pub async fn browse(&self, queue: &MailQueueName) -> Result<BrowseStream> {
        self.verify_layout(queue, false).await?;

        let Some(start) = self.browse_start(queue).await? else {
            internal!(level = DEBUG, "Queue {queue} has no browse start, nothing to browse");
            return Ok(stream::empty().boxed());
        };

        let now = self.inner.slices.now();
        let slices = self.inner.slices.slices_from(start, now);

        Ok(BrowseState::new(self.clone(), queue.clone(), slices, now).into_stream())
    }

    /// [`MailQueueView::browse`], ending early once `shutdown` delivers a signal
    ///
    /// # Errors
    /// As [`MailQueueView::browse`]
    pub async fn browse_until(
        &self,
        queue: &MailQueueName,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<BrowseStream> {
        let browse = self.browse(queue).await?;

        let stop = async move {
            loop {
                match shutdown.recv().await {
                    Ok(_) => break,
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => std::future::pending::<()>().await,
                }
            }
        };

        Ok(browse.take_until(stop).boxed())
    }

    /// Browse `queue` to completion
    ///
    /// # Errors
    /// As [`MailQueueView::browse`]; partition failures are in the report
    pub async fn browse_report(&self, queue: &MailQueueName) -> Result<BrowseReport> {
        Ok(BrowseReport::collect(self.browse(queue).await?).await)
    }

    /// Count the visible mails of `queue`.
    ///
    /// This browses the whole queue: O(visible mails). Meant for
    /// administration and diagnostics only.
    ///
    /// # Errors
    /// As [`MailQueueView::browse`]; partition failures are in the report
    #[instrument(level = "debug", skip(self), fields(%queue))]
    pub async fn size(&self, queue: &MailQueueName) -> Result<SizeReport> {
        Ok(SizeReport::count(self.browse(queue).await?).await)
    }

    /// Hide `key` from every later browse of `queue`.
    ///
    /// The stored record is left untouched.
    ///
    /// # Errors
    /// If the marker cannot be written
    #[instrument(level = "debug", skip(self), fields(%queue, %key))]
    pub async fn delete(&self, queue: &MailQueueName, key: &MailKey) -> Result<()> {
        self.retry("mark_deleted", || self.inner.deletions.mark_deleted(queue, key))
            .await?;

        internal!(level = DEBUG, "Marked {key} deleted in {queue}");
        Ok(())
    }

    /// Whether `key` has not been deleted from `queue`
    ///
    /// # Errors
    /// If the deletion index cannot be read
    pub async fn is_present(&self, queue: &MailQueueName, key: &MailKey) -> Result<bool> {
        let deleted = self
            .retry("is_deleted", || self.inner.deletions.is_deleted(queue, key))
            .await?;

        Ok(!deleted)
    }

    /// Delete every visible mail of `queue` matching `filter`.
    ///
    /// Returns the deleted mails, plus the partitions that could not be
    /// searched.
    ///
    /// # Errors
    /// As [`MailQueueView::browse`], or if a marker cannot be written
    #[instrument(level = "debug", skip(self), fields(%queue))]
    pub async fn delete_matching(
        &self,
        queue: &MailQueueName,
        filter: &MailFilter,
    ) -> Result<BrowseReport> {
        let mut browse = self.browse(queue).await?;
        let mut report = BrowseReport::default();

        while let Some(item) = browse.next().await {
            match item {
                Ok(mail) if filter.matches(&mail) => {
                    self.delete(queue, &mail.key).await?;
                    report.mails.push(mail);
                }
                Ok(_) => {}
                Err(failure) => report.failures.push(failure),
            }
        }

        internal!(
            level = INFO,
            "Deleted {} mail(s) from {queue} matching {filter:?}",
            report.mails.len()
        );

        Ok(report)
    }

    /// Delete every visible mail of `queue`
    ///
    /// # Errors
    /// As [`MailQueueView::delete_matching`]
    pub async fn clear(&self, queue: &MailQueueName) -> Result<BrowseReport> {
        self.delete_matching(queue, &MailFilter::All).await
    }

    /// Move the browse start of `queue` to its first slice holding visible mail.
    ///
    /// Only fully elapsed slices are skipped. Returns the browse start after
    /// the update, or `None` for a queue that was never written to.
    ///
    /// # Errors
    /// If the cursor cannot be read or written, or the layout mismatches
    #[instrument(level = "debug", skip(self), fields(%queue))]
    pub async fn update_browse_start(&self, queue: &MailQueueName) -> Result<Option<Slice>> {
        self.verify_layout(queue, false).await?;

        let Some(start) = self.browse_start(queue).await? else {
            return Ok(None);
        };

        let now = self.inner.slices.now();
        let mut target = start;
        for slice in self.inner.slices.slices_from(start, now) {
            target = slice;
            if !slice.is_elapsed(now) || !self.scan_slice(queue, slice).await.is_empty() {
                break;
            }
            target = slice.next();
        }

        if target > start {
            self.retry("advance_browse_start", || {
                self.inner.cursors.advance(queue, target)
            })
            .await?;
            internal!(level = DEBUG, "Browse start of {queue} moved to {target}");
        }

        self.browse_start(queue).await
    }

    /// Every queue that has been written to
    ///
    /// # Errors
    /// If the layout registry cannot be read
    pub async fn queues(&self) -> Result<Vec<MailQueueName>> {
        self.retry("list_queues", || self.inner.layouts.queues())
            .await
    }

    /// Visible mails of one partition
    async fn visible_in(
        &self,
        queue: &MailQueueName,
        bucket: BucketId,
        slice: Slice,
    ) -> Result<Vec<EnqueuedMail>> {
        let mails = self
            .retry("fetch", || self.inner.mails.fetch(queue, bucket, slice))
            .await?;

        let mut visible = Vec::with_capacity(mails.len());
        for mail in mails {
            if self.is_present(queue, &mail.key).await? {
                visible.push(mail);
            }
        }

        Ok(visible)
    }

    /// Read every bucket of one slice with bounded concurrency
    pub(crate) async fn scan_slice(&self, queue: &MailQueueName, slice: Slice) -> SliceScan {
        let mut results: Vec<_> = stream::iter(BucketId::all(self.inner.layout.bucket_count))
            .map(|bucket| async move { (bucket, self.visible_in(queue, bucket, slice).await) })
            .buffer_unordered(self.inner.parallelism)
            .collect()
            .await;
        results.sort_by_key(|(bucket, _)| *bucket);

        let mut scan = SliceScan::default();
        for (bucket, result) in results {
            match result {
                Ok(mails) => scan.visible.extend(mails),
                Err(err) => {
                    error!(%queue, %bucket, %slice, error = %err, "Failed to read partition");
                    scan.failures.push(PartitionFailure {
                        bucket,
                        slice,
                        error: partition_error(err),
                    });
                }
            }
        }

        scan
    }

    /// Move the browse start forward, logging instead of failing
    pub(crate) async fn try_advance(&self, queue: &MailQueueName, to: Slice) {
        match self
            .retry("advance_browse_start", || self.inner.cursors.advance(queue, to))
            .await
        {
            Ok(true) => internal!(level = DEBUG, "Browse start of {queue} moved to {to}"),
            Ok(false) => {}
            Err(err) => warn!(%queue, slice = %to, error = %err, "Failed to advance browse start"),
        }
    }
}

/// The storage error behind a failed partition read
fn partition_error(err: ViewError) -> crate::StoreError {
    match err {
        ViewError::StorageUnavailable { source, .. } | ViewError::Storage { source, .. } => source,
        other => crate::StoreError::Unavailable(other.to_string()),
    }
}

/// Builder for [`MailQueueView`]
///
/// Every relation defaults to the store given to [`MailQueueView::builder`];
/// each can be overridden to spread them over different backends.
#[derive(Debug)]
pub struct MailQueueViewBuilder {
    config: MailQueueViewConfig,
    mails: Arc<dyn EnqueuedMailStore>,
    cursors: Arc<dyn BrowseCursorStore>,
    deletions: Arc<dyn DeletionIndex>,
    layouts: Arc<dyn LayoutStore>,
    clock: Arc<dyn Clock>,
}

impl MailQueueViewBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn mails(mut self, mails: Arc<dyn EnqueuedMailStore>) -> Self {
        self.mails = mails;
        self
    }

    #[must_use]
    pub fn cursors(mut self, cursors: Arc<dyn BrowseCursorStore>) -> Self {
        self.cursors = cursors;
        self
    }

    #[must_use]
    pub fn deletions(mut self, deletions: Arc<dyn DeletionIndex>) -> Self {
        self.deletions = deletions;
        self
    }

    #[must_use]
    pub fn layouts(mut self, layouts: Arc<dyn LayoutStore>) -> Self {
        self.layouts = layouts;
        self
    }

    /// Build the final [`MailQueueView`]
    ///
    /// # Errors
    /// If the configuration is invalid
    pub fn build(self) -> Result<MailQueueView> {
        self.config.validate()?;

        internal!(
            level = INFO,
            "Mail queue view using {} with browse parallelism {}",
            self.config.layout(),
            self.config.effective_parallelism()
        );

        Ok(MailQueueView {
            inner: Arc::new(Inner {
                layout: self.config.layout(),
                parallelism: self.config.effective_parallelism(),
                slices: SliceCalculator::new(self.config.slice_width(), self.clock),
                config: self.config,
                mails: self.mails,
                cursors: self.cursors,
                deletions: self.deletions,
                layouts: self.layouts,
                verified: DashSet::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        backends::{MemoryStore, Operation, TestStore},
        clock::ManualClock,
        types::PayloadRef,
    };

    const HOUR: Duration = Duration::from_secs(3600);

    fn config(bucket_count: u32) -> MailQueueViewConfig {
        MailQueueViewConfig {
            bucket_count,
            retry: mailqueue_common::config::StorageRetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_factor: 0.0,
                ..Default::default()
            },
            ..MailQueueViewConfig::default()
        }
    }

    fn view_on<S: ViewStore>(store: Arc<S>, clock: &ManualClock, bucket_count: u32) -> MailQueueView {
        MailQueueView::builder(config(bucket_count), store)
            .clock(Arc::new(clock.clone()))
            .build()
            .expect("Failed to build view")
    }

    fn mail(key: &str) -> Mail {
        Mail::new(key, PayloadRef::new(format!("blob-{key}")))
    }

    fn keys(report: &BrowseReport) -> Vec<String> {
        report.mails.iter().map(|mail| mail.key.to_string()).collect()
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_enqueue_places_mail_in_its_partition() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 2);
        let queue = MailQueueName::from("spool");

        let enqueued = view.enqueue(&queue, &mail("m1")).await.expect("Failed to enqueue");

        assert_eq!(enqueued.slice, Slice::of(clock.now(), HOUR));
        assert_eq!(enqueued.bucket, bucket_of(&MailKey::from("m1"), 2));
        assert_eq!(view.browse_start(&queue).await.expect("cursor"), Some(enqueued.slice));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_skips_deleted_mail() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 2);
        let queue = MailQueueName::from("spool");

        view.enqueue(&queue, &mail("m1")).await.expect("enqueue");
        view.enqueue(&queue, &mail("m2")).await.expect("enqueue");
        view.delete(&queue, &MailKey::from("m1")).await.expect("delete");

        let report = view.browse_report(&queue).await.expect("browse");
        assert_eq!(keys(&report), vec!["m2"]);
        assert!(!view.is_present(&queue, &MailKey::from("m1")).await.expect("present"));
        assert_eq!(store.len(), 2, "Deletion must not remove the record");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_enqueue_fails_when_cursor_cannot_be_initialised() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 1);
        let queue = MailQueueName::from("spool");

        store.fail_operation_always(Operation::InitializeCursor);
        let result = view.enqueue(&queue, &mail("m1")).await;

        assert!(matches!(
            result,
            Err(ViewError::StorageUnavailable {
                operation: "initialize_browse_start",
                ..
            })
        ));
        assert_eq!(store.calls(Operation::InitializeCursor), 3);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_enqueue_retries_transient_insert_failures() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 1);
        let queue = MailQueueName::from("spool");

        store.fail_operation(Operation::Insert, 2);
        view.enqueue(&queue, &mail("m1")).await.expect("Retries should absorb failures");

        assert_eq!(store.calls(Operation::Insert), 3);
        assert_eq!(store.inner().len(), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_layout_mismatch_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let queue = MailQueueName::from("spool");

        view_on(store.clone(), &clock, 2)
            .enqueue(&queue, &mail("m1"))
            .await
            .expect("enqueue");

        let resized = view_on(store.clone(), &clock, 4);
        let enqueue = resized.enqueue(&queue, &mail("m2")).await;
        assert!(matches!(enqueue, Err(ViewError::BucketLayoutMismatch { .. })));

        let browse = resized.browse(&queue).await;
        assert!(matches!(browse, Err(ViewError::BucketLayoutMismatch { .. })));
        assert_eq!(store.len(), 1, "Nothing may be written under the wrong layout");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_unknown_queue_is_empty_and_registers_nothing() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(10 * 3600);
        let view = view_on(store.clone(), &clock, 4);
        let queue = MailQueueName::from("never-written");

        let report = view.browse_report(&queue).await.expect("browse");

        assert!(report.mails.is_empty());
        assert!(report.is_complete());
        assert_eq!(store.calls(Operation::Fetch), 0);
        assert!(view.queues().await.expect("queues").is_empty());
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_orders_slices_ascending() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store, &clock, 3);
        let queue = MailQueueName::from("spool");

        for key in ["a", "b", "c"] {
            view.enqueue(&queue, &mail(key)).await.expect("enqueue");
            clock.advance(HOUR);
        }

        let report = view.browse_report(&queue).await.expect("browse");
        assert_eq!(keys(&report), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_advances_cursor_past_elapsed_empty_slices() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store, &clock, 2);
        let queue = MailQueueName::from("spool");

        view.enqueue(&queue, &mail("old")).await.expect("enqueue");
        clock.advance(3 * HOUR);
        view.enqueue(&queue, &mail("new")).await.expect("enqueue");
        view.delete(&queue, &MailKey::from("old")).await.expect("delete");

        let report = view.browse_report(&queue).await.expect("browse");
        assert_eq!(keys(&report), vec!["new"]);

        // slices 0..3h were empty and elapsed; the current slice stops the cursor
        assert_eq!(
            view.browse_start(&queue).await.expect("cursor"),
            Some(Slice::of(clock.now(), HOUR))
        );
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_never_advances_past_a_failed_partition() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 2);
        let queue = MailQueueName::from("spool");

        let first = view.enqueue(&queue, &mail("m1")).await.expect("enqueue");
        view.delete(&queue, &MailKey::from("m1")).await.expect("delete");
        clock.advance(2 * HOUR);

        store.fail_partition_always(BucketId::new(1), first.slice);
        let report = view.browse_report(&queue).await.expect("browse");

        assert!(report.mails.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].bucket, BucketId::new(1));
        assert_eq!(view.browse_start(&queue).await.expect("cursor"), Some(first.slice));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_partial_browse_keeps_other_partitions() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store.clone(), &clock, 4);
        let queue = MailQueueName::from("spool");

        let mut placed = Vec::new();
        for i in 0..40 {
            placed.push(view.enqueue(&queue, &mail(&format!("m{i}"))).await.expect("enqueue"));
        }

        let broken = BucketId::new(2);
        store.fail_partition_always(broken, placed[0].slice);

        let report = view.browse_report(&queue).await.expect("browse");
        let expected = placed.iter().filter(|mail| mail.bucket != broken).count();

        assert_eq!(report.mails.len(), expected);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.into_result(), Err(ViewError::PartialBrowse(_))));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_bucket_fetches_are_bounded() {
        let store = Arc::new(TestStore::new());
        let clock = ManualClock::at_secs(0);
        let queue = MailQueueName::from("spool");
        let view = MailQueueView::builder(
            MailQueueViewConfig {
                bucket_count: 8,
                browse_parallelism: Some(2),
                ..config(8)
            },
            store.clone(),
        )
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("build");

        view.enqueue(&queue, &mail("m1")).await.expect("enqueue");
        store.set_fetch_latency(Some(Duration::from_millis(5)));
        store.reset_counters();

        view.size(&queue).await.expect("size");

        assert_eq!(store.calls(Operation::Fetch), 8);
        assert!(store.max_concurrent_fetches() <= 2);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_update_browse_start() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store, &clock, 2);
        let queue = MailQueueName::from("spool");

        assert_eq!(view.update_browse_start(&queue).await.expect("update"), None);

        view.enqueue(&queue, &mail("consumed")).await.expect("enqueue");
        clock.advance(HOUR);
        let pending = view.enqueue(&queue, &mail("pending")).await.expect("enqueue");
        clock.advance(5 * HOUR);
        view.delete(&queue, &MailKey::from("consumed")).await.expect("delete");

        let start = view.update_browse_start(&queue).await.expect("update");
        assert_eq!(start, Some(pending.slice));

        view.delete(&queue, &MailKey::from("pending")).await.expect("delete");
        let start = view.update_browse_start(&queue).await.expect("update");
        assert_eq!(start, Some(Slice::of(clock.now(), HOUR)));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_delete_matching_sender() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store, &clock, 2);
        let queue = MailQueueName::from("spool");

        view.enqueue(&queue, &mail("a").with_sender("spam@example.com"))
            .await
            .expect("enqueue");
        view.enqueue(&queue, &mail("b").with_sender("ok@example.com"))
            .await
            .expect("enqueue");
        view.enqueue(&queue, &mail("c").with_sender("spam@example.com"))
            .await
            .expect("enqueue");

        let deleted = view
            .delete_matching(&queue, &MailFilter::Sender("spam@example.com".into()))
            .await
            .expect("delete");
        assert_eq!(deleted.mails.len(), 2);

        let remaining = view.browse_report(&queue).await.expect("browse");
        assert_eq!(keys(&remaining), vec!["b"]);

        let cleared = view.clear(&queue).await.expect("clear");
        assert_eq!(keys(&cleared), vec!["b"]);
        assert_eq!(view.size(&queue).await.expect("size").count, 0);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_browse_until_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_secs(0);
        let view = view_on(store, &clock, 1);
        let queue = MailQueueName::from("spool");

        for i in 0..5 {
            view.enqueue(&queue, &mail(&format!("m{i}"))).await.expect("enqueue");
        }

        let (tx, rx) = broadcast::channel(1);
        let mut browse = view.browse_until(&queue, rx).await.expect("browse");

        assert!(browse.next().await.is_some());
        tx.send(Signal::Shutdown).expect("send");
        assert!(browse.next().await.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = MailQueueView::builder(
            MailQueueViewConfig {
                bucket_count: 0,
                ..MailQueueViewConfig::default()
            },
            Arc::new(MemoryStore::new()),
        )
        .build();

        assert!(matches!(result, Err(ViewError::Configuration(_))));
    }
}
