//! Shared fixtures for view integration tests

use std::{sync::Arc, time::Duration};

use mailqueue_common::config::StorageRetryConfig;
use mailqueue_view::{
    BrowseReport, MailQueueView, MailQueueViewConfig, ManualClock, Mail, PayloadRef, ViewStore,
};

pub const HOUR: Duration = Duration::from_secs(3600);

/// Retry policy that keeps failing tests fast
pub fn fast_retry() -> StorageRetryConfig {
    StorageRetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_factor: 0.0,
        operation_timeout_ms: 1000,
    }
}

pub fn config(bucket_count: u32) -> MailQueueViewConfig {
    MailQueueViewConfig {
        bucket_count,
        slice_width_secs: 3600,
        retry: fast_retry(),
        ..MailQueueViewConfig::default()
    }
}

pub fn view<S: ViewStore>(store: Arc<S>, clock: &ManualClock, bucket_count: u32) -> MailQueueView {
    MailQueueView::builder(config(bucket_count), store)
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("Failed to build view")
}

pub fn mail(key: &str) -> Mail {
    Mail::new(key, PayloadRef::new(format!("blob/{key}")))
        .with_sender("sender@example.com")
        .with_recipient("recipient@example.com")
        .with_size(1024)
}

pub fn keys(report: &BrowseReport) -> Vec<String> {
    report.mails.iter().map(|mail| mail.key.to_string()).collect()
}
