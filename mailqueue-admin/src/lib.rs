//! Administrative operations over mailqueue views
//!
//! This crate is what operator tooling talks to. It lists known queues,
//! browses and counts them, hides single mails and reports per-queue details
//! including the dead-letter health of the underlying transport.

pub mod config;
pub mod error;
pub mod health;
pub mod service;

pub use config::AdminConfig;
pub use error::{AdminError, Result};
pub use health::{DeadLetterCheck, DeadLetterHealth, DeadLetterProbe, TransportProbe};
pub use service::{MailQueueAdmin, QueueAdministration, QueueDetails};
