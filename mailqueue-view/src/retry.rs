//! Bounded retry with exponential backoff at the storage boundary

use std::{future::Future, time::Duration};

use mailqueue_common::config::StorageRetryConfig;
use rand::Rng;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Apply `jitter_factor` (±) to `delay`
fn jittered(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }

    let secs = delay.as_secs_f64();
    let range = secs * jitter_factor;
    let jitter: f64 = rand::rng().random_range(-range..=range);

    Duration::from_secs_f64((secs + jitter).max(0.0))
}

/// Run `call` until it succeeds, fails permanently, or the attempt budget runs out.
///
/// Every attempt is bounded by the configured operation timeout; an attempt
/// that exceeds it counts as [`StoreError::Timeout`]. Only transient errors
/// are retried. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    config: &StorageRetryConfig,
    operation: &'static str,
    mut call: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let timeout = config.operation_timeout();
    let mut attempt = 1;

    loop {
        let result = tokio::time::timeout(timeout, call())
            .await
            .unwrap_or(Err(StoreError::Timeout(timeout)));

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = jittered(config.backoff(attempt), config.jitter_factor);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Storage call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
