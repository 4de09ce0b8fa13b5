use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TesiraError};

/// Bounded retry applied around every device operation.
///
/// The same policy wraps all of them: a fixed number of attempts with a
/// fixed pause in between, and the final failure wrapped so callers can
/// still see what went wrong on the last attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempt budget is spent.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    debug!(operation, attempt, error = %e, "retrying operation");
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    return Err(TesiraError::RetriesExhausted {
                        attempts,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}
