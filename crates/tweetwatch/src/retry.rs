//! Retry policy for external calls.
//!
//! Nothing in tweetwatch retries on its own. A [`RetryPolicy`] is opt-in and
//! wraps a single call; [`RetryingClassifier`] applies one to a classifier.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::classifier::Classifier;
use crate::error::ClassifierError;

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Randomize each delay within [delay / 2, delay].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// A single attempt.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy making up to `max_attempts` attempts with default backoff.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let seconds = if self.jitter && capped > 0.0 {
            rand::thread_rng().gen_range(capped / 2.0..=capped)
        } else {
            capped
        };
        Duration::from_secs_f64(seconds)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A classifier that retries transient failures.
pub struct RetryingClassifier<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Classifier> RetryingClassifier<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: Classifier> Classifier for RetryingClassifier<C> {
    async fn classify(&self, text: &str, criterion: &str) -> Result<String, ClassifierError> {
        self.policy
            .run(
                || self.inner.classify(text, criterion),
                ClassifierError::is_transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
        assert_eq!(policy.delay(30), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(400),
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = RetryPolicy::default()
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("boom".to_string()) }
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = RetryPolicy::with_attempts(5)
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(format!("attempt {}", n))
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_early() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = RetryPolicy::with_attempts(5)
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |e: &String| e != "fatal",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
