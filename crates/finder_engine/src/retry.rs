//! Bounded retry with exponential backoff for catalog lookups.
//!
//! Only [`CatalogError::Transient`] is retried. Auth, not-found, decode and
//! unexpected-status errors come back on the first failure. Waits end early
//! when the run is cancelled.

use std::future::Future;
use std::time::Duration;

use finder_logging::{finder_debug, finder_warn};

use crate::{CatalogError, RunCanceller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Wait before retry `attempt` (starting at 0): `backoff_base * 2^attempt`,
    /// or the server's `Retry-After` when longer, never above `max_backoff`.
    pub fn delay_for(&self, attempt: u32, err: &CatalogError) -> Duration {
        let mut delay = self.backoff_base.saturating_mul(1u32 << attempt.min(20));
        if let CatalogError::Transient {
            retry_after: Some(requested),
            ..
        } = err
        {
            delay = delay.max(*requested);
        }
        delay.min(self.max_backoff)
    }
}

/// Runs `operation` up to `1 + max_retries` times.
///
/// A cancel observed before or during a wait returns the last error without
/// another attempt.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &RunCanceller,
    mut operation: F,
) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retriable() || attempt >= policy.max_retries || cancel.is_cancelled() {
            return Err(err);
        }

        let delay = policy.delay_for(attempt, &err);
        finder_warn!(
            "transient catalog error (attempt {}/{}), retrying in {:?}: {}",
            attempt + 1,
            policy.max_retries,
            delay,
            err
        );
        tokio::select! {
            () = cancel.cancelled() => {
                finder_debug!("retry abandoned after cancel: {}", err);
                return Err(err);
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
