//! Lazy browsing of a queue, slice by slice.
//!
//! Slices are scanned strictly in ascending order. Within a slice every
//! bucket is fetched with bounded concurrency and the whole slice is
//! buffered, so memory never holds more than one slice. While the scanned
//! slices are fully elapsed and empty the browse cursor is pushed past them;
//! the first slice holding visible mail, or one that could not be read
//! completely, stops the cursor for the rest of the browse.

use std::{collections::VecDeque, time::SystemTime};

use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};

use crate::{
    bucket::BucketId,
    error::{StoreError, ViewError},
    slice::{Slice, Slices},
    types::{EnqueuedMail, MailQueueName},
    view::MailQueueView,
};

/// A `(bucket, slice)` partition that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub bucket: BucketId,
    pub slice: Slice,
    pub error: StoreError,
}

impl std::fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bucket {} slice {}: {}", self.bucket, self.slice, self.error)
    }
}

/// One element of a browse: a visible mail, or a partition that failed
pub type BrowseItem = Result<EnqueuedMail, PartitionFailure>;

/// Lazily produced browse output.
///
/// Dropping the stream cancels any bucket fetches still in flight.
pub type BrowseStream = BoxStream<'static, BrowseItem>;

/// Everything a browse produced, including the partitions it could not read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseReport {
    pub mails: Vec<EnqueuedMail>,
    pub failures: Vec<PartitionFailure>,
}

impl BrowseReport {
    /// Drain a browse stream to completion
    pub async fn collect(mut stream: BrowseStream) -> Self {
        let mut report = Self::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(mail) => report.mails.push(mail),
                Err(failure) => report.failures.push(failure),
            }
        }

        report
    }

    /// Whether every partition was read
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The mails, or [`ViewError::PartialBrowse`] carrying this report
    ///
    /// # Errors
    /// If any partition failed
    pub fn into_result(self) -> Result<Vec<EnqueuedMail>, ViewError> {
        if self.is_complete() {
            Ok(self.mails)
        } else {
            Err(ViewError::PartialBrowse(self))
        }
    }
}

/// Result of counting a queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeReport {
    /// Visible mails counted in the partitions that could be read
    pub count: u64,
    pub failures: Vec<PartitionFailure>,
}

impl SizeReport {
    /// Drain a browse stream, counting its mails
    pub async fn count(mut stream: BrowseStream) -> Self {
        let mut report = Self::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(_) => report.count += 1,
                Err(failure) => report.failures.push(failure),
            }
        }

        report
    }

    /// Whether `count` is exact
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The content of one slice after deletion filtering
#[derive(Debug, Default)]
pub(crate) struct SliceScan {
    /// Visible mails, grouped by ascending bucket
    pub visible: Vec<EnqueuedMail>,
    pub failures: Vec<PartitionFailure>,
}

impl SliceScan {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.failures.is_empty()
    }
}

pub(crate) struct BrowseState {
    view: MailQueueView,
    queue: MailQueueName,
    slices: Slices,
    now: SystemTime,
    ready: VecDeque<BrowseItem>,
    advancing: bool,
}

impl BrowseState {
    pub fn new(view: MailQueueView, queue: MailQueueName, slices: Slices, now: SystemTime) -> Self {
        Self {
            view,
            queue,
            slices,
            now,
            ready: VecDeque::new(),
            advancing: true,
        }
    }

    async fn scan(&mut self, slice: Slice) {
        let scan = self.view.scan_slice(&self.queue, slice).await;

        if self.advancing {
            if scan.is_empty() && slice.is_elapsed(self.now) {
                self.view.try_advance(&self.queue, slice.next()).await;
            } else {
                self.advancing = false;
            }
        }

        self.ready.extend(scan.visible.into_iter().map(Ok));
        self.ready.extend(scan.failures.into_iter().map(Err));
    }

    pub fn into_stream(self) -> BrowseStream {
        stream::unfold(self, |mut state| async move {
            loop {
                if let Some(item) = state.ready.pop_front() {
                    return Some((item, state));
                }

                let slice = state.slices.next()?;
                state.scan(slice).await;
            }
        })
        .boxed()
    }
}
