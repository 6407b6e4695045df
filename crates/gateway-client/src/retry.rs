//! Fixed-delay retry policy
//!
//! One retry discipline shared by gateway discovery and session persistence:
//! a constant delay between attempts and either a bounded attempt count or
//! none at all.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// A fixed-delay retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry up to `max_attempts` total attempts, `delay` apart
    #[must_use]
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Retry forever, `delay` apart
    #[must_use]
    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    ///
    /// The final error is returned only for bounded policies; an unbounded
    /// policy never returns `Err`.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "retryable operation failed");

                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            return Err(e);
                        }
                    }

                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
