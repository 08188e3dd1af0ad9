use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::{ProviderError, ProviderErrorKind};

/// Timeout and retry budget applied to every vendor call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl CallPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `op` with a per-attempt timeout, retrying retriable failures until
    /// the budget is spent. Non-retriable failures return immediately.
    ///
    /// Dropping the returned future cancels the in-flight attempt.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    format!("{operation} exceeded {}ms", self.timeout.as_millis()),
                )),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "vendor call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.retriable && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        kind = %e.kind,
                        delay_ms = delay.as_millis() as u64,
                        "retrying vendor call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.retriable {
                        warn!(operation, attempts = attempt, kind = %e.kind, "retry budget exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
