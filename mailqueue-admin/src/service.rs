//! The administrative service exposed to operator tooling

use std::sync::Arc;

use async_trait::async_trait;
use mailqueue_common::admin;
use mailqueue_view::{BrowseStream, MailKey, MailQueueName, MailQueueView, SizeReport, Transport};
use tracing::instrument;

use crate::{
    config::AdminConfig,
    error::{AdminError, Result},
    health::{DeadLetterCheck, DeadLetterHealth, TransportProbe},
};

/// Everything known about one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDetails {
    pub name: MailQueueName,
    /// Visible mails, exact only when the report is complete
    pub size: SizeReport,
    pub dead_letter: DeadLetterHealth,
}

/// Administrative operations on mail queues
#[async_trait]
pub trait QueueAdministration: Send + Sync {
    /// Every queue that has been written to
    async fn list_queues(&self) -> Result<Vec<MailQueueName>>;

    /// Lazily list the visible mails of `queue`; empty for an unknown queue
    async fn browse(&self, queue: &MailQueueName) -> Result<BrowseStream>;

    /// Count the visible mails of `queue`
    async fn get_size(&self, queue: &MailQueueName) -> Result<SizeReport>;

    /// Hide `key` from every later browse of `queue`
    async fn delete_mail(&self, queue: &MailQueueName, key: &MailKey) -> Result<()>;

    /// Size estimate and dead-letter indicator of `queue`
    async fn get_queue_details(&self, queue: &MailQueueName) -> Result<QueueDetails>;
}

/// [`QueueAdministration`] over a [`MailQueueView`] and its transport
#[derive(Debug, Clone)]
pub struct MailQueueAdmin {
    view: MailQueueView,
    dead_letters: DeadLetterCheck,
}

impl MailQueueAdmin {
    #[must_use]
    pub const fn new(view: MailQueueView, dead_letters: DeadLetterCheck) -> Self {
        Self { view, dead_letters }
    }

    /// Administer `view`, probing `transport` for dead letters
    #[must_use]
    pub fn with_transport(
        config: &AdminConfig,
        view: MailQueueView,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let probe = Arc::new(TransportProbe(transport));
        Self::new(view, DeadLetterCheck::new(probe, config.dead_letter_timeout()))
    }

    #[must_use]
    pub const fn view(&self) -> &MailQueueView {
        &self.view
    }
}

#[async_trait]
impl QueueAdministration for MailQueueAdmin {
    async fn list_queues(&self) -> Result<Vec<MailQueueName>> {
        Ok(self.view.queues().await?)
    }

    async fn browse(&self, queue: &MailQueueName) -> Result<BrowseStream> {
        admin!("Browsing {queue}");
        Ok(self.view.browse(queue).await?)
    }

    async fn get_size(&self, queue: &MailQueueName) -> Result<SizeReport> {
        let size = self.view.size(queue).await?;

        if !size.is_complete() {
            admin!(
                level = WARN,
                "Size of {queue} is a lower bound, {} partition(s) unreadable",
                size.failures.len()
            );
        }

        Ok(size)
    }

    #[instrument(level = "debug", skip(self), fields(%queue, %key))]
    async fn delete_mail(&self, queue: &MailQueueName, key: &MailKey) -> Result<()> {
        self.view.delete(queue, key).await?;

        admin!(level = INFO, "Deleted {key} from {queue}");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(%queue))]
    async fn get_queue_details(&self, queue: &MailQueueName) -> Result<QueueDetails> {
        if !self.view.queues().await?.contains(queue) {
            return Err(AdminError::QueueUnknown(queue.clone()));
        }

        let (size, dead_letter) = tokio::join!(self.get_size(queue), self.dead_letters.check(queue));

        Ok(QueueDetails {
            name: queue.clone(),
            size: size?,
            dead_letter,
        })
    }
}
