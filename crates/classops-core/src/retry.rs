//! Bounded retry with exponential backoff for remote calls
//!
//! Transient failures (timeouts, transport errors, 5xx, rate limiting) are
//! retried up to a fixed attempt bound; everything else fails immediately.
//! Callers downgrade an exhausted retry to a per-entity failure so one
//! entity's bad luck never aborts its siblings.

use std::future::Future;
use std::time::Duration;

use classops_remote::{RemoteError, RemoteResult};
use tracing::warn;

/// Retry policy: attempt bound plus exponential backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
    /// Multiplier applied per retry
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Delay before retry number `retry` (0-indexed), capped at the ceiling.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::from_millis(self.initial_delay_ms);
        }
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// Run `op` until it succeeds, fails terminally, or exhausts the
    /// attempt bound. Only transient errors are retried.
    pub async fn run<T, F, Fut>(&self, name: &str, mut op: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && retry + 1 < self.max_attempts => {
                    let delay = self.delay_for_retry(retry);
                    warn!(
                        op = name,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient remote failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether a remote error must abort the whole run instead of being
/// downgraded to a per-entity failure.
pub fn is_fatal(err: &RemoteError) -> bool {
    matches!(err, RemoteError::Authorization(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(100)
            .with_max_delay(1_000);

        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_up_to_the_bound() {
        let policy = RetryPolicy::new(3).with_initial_delay(10);
        let calls = AtomicU32::new(0);

        let result: RemoteResult<()> = policy
            .run("always_503", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RemoteError::Status {
                        code: 503,
                        message: "unavailable".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3).with_initial_delay(10);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RemoteError::Timeout("slow".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: RemoteResult<()> = policy
            .run("bad_request", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RemoteError::Status {
                        code: 422,
                        message: "validation".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
