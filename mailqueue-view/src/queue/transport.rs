//! The message transport seam
//!
//! A transport only knows publish, consume, acknowledge and reject. It has no
//! way to list or remove what it holds, which is why the view exists.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Mail, MailQueueName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(DeliveryTag),

    #[error("Transport is closed")]
    Closed,
}

/// Identifies one unacknowledged delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    #[must_use]
    pub const fn new(tag: u64) -> Self {
        Self(tag)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mail handed out by [`Transport::consume`], pending acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub mail: Mail,
}

/// Durable publish/consume message transport
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Durably append `mail` to `queue`
    async fn publish(&self, queue: &MailQueueName, mail: &Mail) -> Result<(), TransportError>;

    /// Take the next ready mail of `queue`, if any
    async fn consume(&self, queue: &MailQueueName) -> Result<Option<Delivery>, TransportError>;

    /// Settle a delivery as done
    async fn ack(&self, queue: &MailQueueName, tag: DeliveryTag) -> Result<(), TransportError>;

    /// Settle a delivery as failed. With `requeue` the mail becomes ready
    /// again, otherwise it moves to the dead-letter queue.
    async fn reject(
        &self,
        queue: &MailQueueName,
        tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), TransportError>;

    /// Number of mails parked in the dead-letter queue of `queue`
    async fn dead_letter_depth(&self, queue: &MailQueueName) -> Result<u64, TransportError>;
}

#[derive(Debug, Default)]
struct Channel {
    ready: VecDeque<Mail>,
    unacked: HashMap<DeliveryTag, Mail>,
    dead: Vec<Mail>,
}

/// In-process [`Transport`]
///
/// Every queue is a FIFO with an unacknowledged set and a dead-letter list.
/// Clones share the same channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    channels: Arc<DashMap<MailQueueName, Mutex<Channel>>>,
    next_tag: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`TransportError::Unavailable`] while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Refuse every later call with [`TransportError::Closed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Mails ready for consumption in `queue`
    #[must_use]
    pub fn ready_len(&self, queue: &MailQueueName) -> usize {
        self.channels
            .get(queue)
            .map_or(0, |channel| channel.lock().ready.len())
    }

    /// Mails consumed from `queue` and not yet settled
    #[must_use]
    pub fn unacked_len(&self, queue: &MailQueueName) -> usize {
        self.channels
            .get(queue)
            .map_or(0, |channel| channel.lock().unacked.len())
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("injected failure".into()));
        }

        Ok(())
    }

    fn settle(
        &self,
        queue: &MailQueueName,
        tag: DeliveryTag,
        settle: impl FnOnce(&mut Channel, Mail),
    ) -> Result<(), TransportError> {
        self.check()?;

        let channel = self
            .channels
            .get(queue)
            .ok_or(TransportError::UnknownDelivery(tag))?;
        let mut channel = channel.lock();
        let mail = channel
            .unacked
            .remove(&tag)
            .ok_or(TransportError::UnknownDelivery(tag))?;

        settle(&mut *channel, mail);
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, queue: &MailQueueName, mail: &Mail) -> Result<(), TransportError> {
        self.check()?;

        self.channels
            .entry(queue.clone())
            .or_default()
            .lock()
            .ready
            .push_back(mail.clone());

        Ok(())
    }

    async fn consume(&self, queue: &MailQueueName) -> Result<Option<Delivery>, TransportError> {
        self.check()?;

        let Some(channel) = self.channels.get(queue) else {
            return Ok(None);
        };
        let mut channel = channel.lock();

        Ok(channel.ready.pop_front().map(|mail| {
            let tag = DeliveryTag(self.next_tag.fetch_add(1, Ordering::SeqCst));
            channel.unacked.insert(tag, mail.clone());
            Delivery { tag, mail }
        }))
    }

    async fn ack(&self, queue: &MailQueueName, tag: DeliveryTag) -> Result<(), TransportError> {
        self.settle(queue, tag, |_, _| {})
    }

    async fn reject(
        &self,
        queue: &MailQueueName,
        tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), TransportError> {
        self.settle(queue, tag, |channel, mail| {
            if requeue {
                channel.ready.push_back(mail);
            } else {
                channel.dead.push(mail);
            }
        })
    }

    async fn dead_letter_depth(&self, queue: &MailQueueName) -> Result<u64, TransportError> {
        self.check()?;

        Ok(self.channels.get(queue).map_or(0, |channel| {
            u64::try_from(channel.lock().dead.len()).unwrap_or(u64::MAX)
        }))
    }
}
