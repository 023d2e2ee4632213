//! Retry logic for indexer calls.
//!
//! Transient upstream failures are retried at most twice with
//! exponential backoff and plus/minus 30 percent jitter. Authorization
//! and payload errors are permanent and returned immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use super::types::SearchError;

/// Maximum retries after the initial attempt.
pub const MAX_RETRIES: u32 = 2;

/// Base delay before the first retry.
const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Trait for errors that can be classified as retryable or not.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should
    /// be retried.
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SearchError {
    fn is_retryable(&self) -> bool {
        match self {
            SearchError::ConnectionFailed(_) | SearchError::Timeout => true,
            // 429 and 5xx responses surface as ApiError with the status
            // embedded in the message.
            SearchError::ApiError(msg) => {
                msg.contains("429")
                    || msg.contains("HTTP 5")
                    || msg.contains("ECONNRESET")
                    || msg.contains("ENOTFOUND")
                    || msg.contains("ETIMEDOUT")
                    || msg.contains("ECONNREFUSED")
                    || msg.contains("EAI_AGAIN")
            }
            SearchError::AuthFailed(_) => false,
            SearchError::PayloadError(_) => false,
            SearchError::CircuitOpen => false,
        }
    }
}

/// Execute an indexer operation with bounded exponential-backoff retry.
pub async fn with_retry<F, Fut, T, E>(mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Search succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                attempt += 1;
                let jittered = add_jitter(delay);
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    delay_ms = jittered.as_millis(),
                    "Search failed, retrying"
                );
                tokio::time::sleep(jittered).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scale a delay by a random factor in [0.7, 1.3].
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.7..=1.3);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
