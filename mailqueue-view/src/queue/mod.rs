//! A transport queue kept in step with its [`MailQueueView`]

mod transport;

use std::sync::Arc;

use mailqueue_common::internal;
use rand::Rng;
use tracing::{instrument, warn};

pub use self::transport::{Delivery, DeliveryTag, MemoryTransport, Transport, TransportError};
use crate::{
    error::QueueError,
    types::{EnqueuedMail, Mail, MailQueueName},
    view::MailQueueView,
};

/// How a consumer finished with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Delivered; the mail leaves the queue
    Success,
    /// Temporary failure; the mail is made ready again
    Retry,
    /// Permanent failure; the mail is dead-lettered
    Fail,
}

/// One named queue of a [`Transport`], indexed by a [`MailQueueView`].
///
/// Publishing always goes to the transport first: once the transport has
/// accepted a mail it is delivered, whatever happens to the index. Mails
/// hidden through the view are acknowledged and skipped on dequeue.
#[derive(Debug, Clone)]
pub struct ViewedMailQueue {
    name: MailQueueName,
    transport: Arc<dyn Transport>,
    view: MailQueueView,
}

impl ViewedMailQueue {
    #[must_use]
    pub fn new(name: impl Into<MailQueueName>, transport: Arc<dyn Transport>, view: MailQueueView) -> Self {
        Self {
            name: name.into(),
            transport,
            view,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &MailQueueName {
        &self.name
    }

    #[must_use]
    pub const fn view(&self) -> &MailQueueView {
        &self.view
    }

    /// Publish `mail`, then index it.
    ///
    /// # Errors
    /// [`QueueError::Transport`] if the transport refused the mail; nothing
    /// was indexed. [`QueueError::Indexing`] if the transport accepted it but
    /// the view could not be updated; the mail will still be delivered.
    #[instrument(level = "debug", skip(self, mail), fields(queue = %self.name, key = %mail.key))]
    pub async fn enqueue(&self, mail: &Mail) -> Result<EnqueuedMail, QueueError> {
        self.transport.publish(&self.name, mail).await?;

        self.view
            .enqueue(&self.name, mail)
            .await
            .map_err(|source| {
                warn!(
                    queue = %self.name,
                    key = %mail.key,
                    error = %source,
                    "Mail published but not indexed"
                );
                QueueError::Indexing {
                    key: mail.key.clone(),
                    source,
                }
            })
    }

    /// Take the next mail that has not been deleted through the view.
    ///
    /// Deleted mails met on the way are acknowledged and dropped. When the
    /// deletion index cannot be read the mail is handed out anyway.
    ///
    /// # Errors
    /// If the transport fails
    #[instrument(level = "debug", skip(self), fields(queue = %self.name))]
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        while let Some(delivery) = self.transport.consume(&self.name).await? {
            let present = match self.view.is_present(&self.name, &delivery.mail.key).await {
                Ok(present) => present,
                Err(err) => {
                    warn!(
                        queue = %self.name,
                        key = %delivery.mail.key,
                        error = %err,
                        "Could not check deletion, delivering"
                    );
                    true
                }
            };

            if present {
                return Ok(Some(delivery));
            }

            internal!(
                level = DEBUG,
                "Skipping deleted mail {} in {}",
                delivery.mail.key,
                self.name
            );
            self.transport.ack(&self.name, delivery.tag).await?;
        }

        Ok(None)
    }

    /// Settle `delivery` with the transport.
    ///
    /// A mail that leaves the queue for good is also hidden from browsing.
    /// Now and then the browse start of the queue is recomputed, at the pace
    /// set by `update_browse_start_pace`.
    ///
    /// # Errors
    /// If the transport fails to settle the delivery
    #[instrument(level = "debug", skip(self, delivery), fields(queue = %self.name, key = %delivery.mail.key))]
    pub async fn complete(
        &self,
        delivery: &Delivery,
        outcome: CompletionOutcome,
    ) -> Result<(), QueueError> {
        match outcome {
            CompletionOutcome::Success => self.transport.ack(&self.name, delivery.tag).await?,
            CompletionOutcome::Retry => {
                self.transport
                    .reject(&self.name, delivery.tag, true)
                    .await?;
            }
            CompletionOutcome::Fail => {
                self.transport
                    .reject(&self.name, delivery.tag, false)
                    .await?;
            }
        }

        if outcome != CompletionOutcome::Retry
            && let Err(err) = self.view.delete(&self.name, &delivery.mail.key).await
        {
            warn!(
                queue = %self.name,
                key = %delivery.mail.key,
                error = %err,
                "Completed mail still visible in the view"
            );
        }

        self.maybe_update_browse_start().await;

        Ok(())
    }

    async fn maybe_update_browse_start(&self) {
        let pace = self.view.config().update_browse_start_pace.max(1);
        if !rand::rng().random_ratio(1, pace) {
            return;
        }

        if let Err(err) = self.view.update_browse_start(&self.name).await {
            warn!(queue = %self.name, error = %err, "Failed to update browse start");
        }
    }

    /// Number of mails parked in the dead-letter queue
    ///
    /// # Errors
    /// If the transport fails
    pub async fn dead_letter_depth(&self) -> Result<u64, QueueError> {
        Ok(self.transport.dead_letter_depth(&self.name).await?)
    }
}
