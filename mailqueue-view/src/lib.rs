//! A queryable view shadowing an append-only mail transport.
//!
//! The transport only offers publish/consume. This crate keeps a secondary
//! index of every enqueued mail, partitioned by `(queue, bucket, slice)`, so
//! that operators can browse a queue, count it and hide individual mails
//! without consuming anything from the transport.
//!
//! - [`bucket`]: hash of a mail key into a fixed bucket space
//! - [`slice`]: fixed-width time windows and their enumeration
//! - [`store`]: the storage seams (mails, browse cursor, deletions, layout)
//! - [`backends`]: in-memory and fault-injecting implementations of the seams
//! - [`view`]: [`MailQueueView`], composing the above
//! - [`queue`]: the transport seam and [`ViewedMailQueue`]

pub mod backends;
pub mod browse;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
mod retry;
pub mod slice;
pub mod store;
pub mod types;
pub mod view;

pub use backends::{MemoryStore, TestStore};
pub use browse::{BrowseItem, BrowseReport, BrowseStream, PartitionFailure, SizeReport};
pub use bucket::{BucketId, bucket_of};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MailQueueViewConfig;
pub use error::{QueueError, StoreError, ViewError};
pub use queue::{
    CompletionOutcome, Delivery, DeliveryTag, MemoryTransport, Transport, TransportError,
    ViewedMailQueue,
};
pub use slice::{Slice, SliceCalculator, Slices, slice_of, slices_between};
pub use store::{BrowseCursorStore, DeletionIndex, EnqueuedMailStore, LayoutStore, ViewStore};
pub use types::{
    EnqueuedMail, Mail, MailFilter, MailKey, MailMetadata, MailQueueName, PayloadRef,
    QueueLayout,
};
pub use view::{MailQueueView, MailQueueViewBuilder};
