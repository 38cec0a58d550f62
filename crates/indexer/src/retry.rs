//! Exponential backoff for transient stage failures

use codeindex_core::config::IndexerConfig;
use codeindex_core::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failed attempt (1-based), doubling each
    /// time up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts
    ///
    /// Only errors classified by [`Error::is_transient`] are retried.
    /// `on_retry` sees each error that is about to be retried.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
        mut on_retry: impl FnMut(u32, &Error),
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        "{operation} failed: {e}. Retrying in {backoff:?} (attempt {attempt}/{})",
                        self.max_attempts
                    );
                    on_retry(attempt, &e);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
