//! Bounded exponential backoff for transient GrsAI failures.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;

const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles after each further failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delays between attempts: base, 2*base, 4*base, ... capped at 30s.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        std::iter::successors(Some(self.base_delay.min(MAX_DELAY)), |delay| {
            Some(delay.saturating_mul(2).min(MAX_DELAY))
        })
        .take(self.max_attempts - 1)
    }

    /// Runs `action`, retrying while it fails with a transient error.
    pub async fn run<T, A, Fut>(&self, what: &str, mut action: A) -> Result<T>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        let max_attempts = self.max_attempts;

        RetryIf::spawn(
            self.delays(),
            || {
                attempt += 1;
                tracing::debug!("{} (attempt {}/{})", what, attempt, max_attempts);
                action()
            },
            |err: &Error| {
                let retry = err.is_transient();
                if retry {
                    tracing::warn!("{} failed: {}. Will retry...", what, err);
                }
                retry
            },
        )
        .await
        .map_err(|err| {
            if err.is_transient() {
                tracing::error!("{} failed after {} attempts: {}", what, max_attempts, err);
            }
            err
        })
    }
}
