//! Dead-letter health of a queue's transport

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mailqueue_view::{MailQueueName, Transport, TransportError};
use serde::Serialize;
use tracing::{debug, warn};

/// Source of dead-letter depth for a queue
#[async_trait]
pub trait DeadLetterProbe: Send + Sync + std::fmt::Debug {
    async fn dead_letter_depth(&self, queue: &MailQueueName) -> Result<u64, TransportError>;
}

/// Probes a [`Transport`] for its dead-letter depth
#[derive(Debug, Clone)]
pub struct TransportProbe(pub Arc<dyn Transport>);

#[async_trait]
impl DeadLetterProbe for TransportProbe {
    async fn dead_letter_depth(&self, queue: &MailQueueName) -> Result<u64, TransportError> {
        self.0.dead_letter_depth(queue).await
    }
}

/// Dead-letter indicator of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeadLetterHealth {
    /// Nothing is dead-lettered
    Healthy,
    /// Mails are dead-lettered; possibly transient
    Degraded { depth: u64 },
    /// The check itself failed
    Unhealthy { reason: String },
}

impl DeadLetterHealth {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Health check over transport-side undeliverable mail
#[derive(Debug, Clone)]
pub struct DeadLetterCheck {
    probe: Arc<dyn DeadLetterProbe>,
    timeout: Duration,
}

impl DeadLetterCheck {
    #[must_use]
    pub fn new(probe: Arc<dyn DeadLetterProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Check `queue`, never failing: probe errors and timeouts are reported
    /// as [`DeadLetterHealth::Unhealthy`]
    pub async fn check(&self, queue: &MailQueueName) -> DeadLetterHealth {
        match tokio::time::timeout(self.timeout, self.probe.dead_letter_depth(queue)).await {
            Ok(Ok(0)) => DeadLetterHealth::Healthy,
            Ok(Ok(depth)) => {
                debug!(%queue, depth, "Dead-lettered mail present");
                DeadLetterHealth::Degraded { depth }
            }
            Ok(Err(err)) => {
                warn!(%queue, error = %err, "Dead-letter check failed");
                DeadLetterHealth::Unhealthy {
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                warn!(%queue, timeout = ?self.timeout, "Dead-letter check timed out");
                DeadLetterHealth::Unhealthy {
                    reason: format!("Timed out after {:?}", self.timeout),
                }
            }
        }
    }
}
