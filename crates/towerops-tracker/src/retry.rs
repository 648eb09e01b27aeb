//! Explicit retry policy for remote calls.
//!
//! Bounded attempts with exponential backoff and jitter. Only errors the
//! predicate marks transient are retried; rate-limit responses extend the
//! delay to whatever the tracker asked for.

use std::time::Duration;

use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

/// Retry behavior for one logical tracker call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// Delay for a given attempt (0-indexed), before rate-limit extension.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            capped * (1.0 + rand_simple() * 0.25)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Delay to apply after a particular error.
    fn delay_for(&self, attempt: u32, error: &TrackerError) -> Duration {
        let backoff = self.backoff_delay(attempt);
        match error {
            TrackerError::RateLimited { retry_after_secs } => {
                backoff.max(Duration::from_secs(*retry_after_secs))
            }
            _ => backoff,
        }
    }

    /// Run an operation with retries on transient errors.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> TrackerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = TrackerResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_transient() || attempt == self.max_retries {
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt, &e);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying tracker call after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(TrackerError::Timeout))
    }
}

/// Simple pseudo-random number in [0, 1) for jitter.
/// Not cryptographically secure, but sufficient here.
fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicUsize::new(0);
        let result = quick_policy()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TrackerError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let result = quick_policy()
            .execute(move || {
                let n = calls_in.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TrackerError::Timeout)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: TrackerResult<()> = quick_policy()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TrackerError::Api {
                        status: 404,
                        message: "gone".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let calls = AtomicUsize::new(0);
        let result: TrackerResult<()> = quick_policy()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TrackerError::Network("broken pipe".into())) }
            })
            .await;
        assert!(matches!(result, Err(TrackerError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4); // 1 attempt + 3 retries
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_extends_delay() {
        let policy = quick_policy();
        let delay = policy.delay_for(
            0,
            &TrackerError::RateLimited {
                retry_after_secs: 2,
            },
        );
        assert!(delay >= Duration::from_secs(2));
    }
}
