//! Cancellable delays and fixed-delay retry.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Sleep for `duration`, returning `Interrupted` as soon as `token` fires.
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> Result<()> {
    if token.is_cancelled() {
        return Err(AppError::Interrupted);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = token.cancelled() => Err(AppError::Interrupted),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Retry policy for one remote operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts; zero is treated as one
    pub limit: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(limit: u32, delay: Duration) -> Self {
        Self { limit, delay }
    }

    /// Run `op` until it succeeds, fails persistently, or runs out of attempts.
    ///
    /// Only transient errors are retried. The last transient error is returned
    /// once `limit` attempts have failed.
    pub async fn run<T, F, Fut>(&self, token: &CancellationToken, context: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.limit.max(1);
        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                return Err(AppError::Interrupted);
            }
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(AppError::Interrupted),
                result = op() => result,
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::error!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        context,
                        attempt,
                        attempts,
                        e,
                        self.delay
                    );
                    sleep_or_cancel(token, self.delay).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
