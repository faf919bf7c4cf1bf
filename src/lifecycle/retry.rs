// Stage-local retry with geometric backoff
// Bounded by attempt count, never by elapsed time

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::Stage;
use crate::gateways::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub interval: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(1),
            backoff_rate: 1.5,
        }
    }
}

/// Why a retried stage gave up
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryError {
    #[error("{stage} failed after {attempts} attempts: {last}")]
    Exhausted {
        stage: Stage,
        attempts: u32,
        last: GatewayError,
    },

    #[error("{stage} failed with a non-retryable error: {source}")]
    NonRetryable {
        stage: Stage,
        attempts: u32,
        source: GatewayError,
    },
}

/// Delays between attempts: `interval, interval * rate, interval * rate^2, ...`
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    next: Duration,
    rate: f64,
    remaining: u32,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next = current.mul_f64(self.rate);
        Some(current)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration, backoff_rate: f64) -> Self {
        Self {
            max_attempts,
            interval,
            backoff_rate,
        }
    }

    /// Policy with the default backoff and a custom ceiling
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    fn attempt_ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Inter-attempt delays; one fewer than the attempt ceiling
    pub fn delays(&self) -> BackoffSchedule {
        BackoffSchedule {
            next: self.interval,
            rate: self.backoff_rate,
            remaining: self.attempt_ceiling() - 1,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt ceiling is reached.
    pub async fn retry<T, F, Fut>(&self, stage: Stage, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.retry_with(stage, operation, |_, _| {}).await
    }

    /// Like [`retry`](Self::retry), calling `on_retry(attempt, error)` before
    /// each backoff sleep.
    pub async fn retry_with<T, F, Fut, R>(
        &self,
        stage: Stage,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
        R: FnMut(u32, &GatewayError),
    {
        let mut delays = self.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(stage = %stage, attempt, "Stage succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    warn!(stage = %stage, attempt, error = %error, "Stage failed (non-retryable)");
                    return Err(RetryError::NonRetryable {
                        stage,
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            stage = %stage,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Stage failed (retryable), backing off"
                        );
                        on_retry(attempt, &error);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(stage = %stage, attempts = attempt, error = %error, "Stage retries exhausted");
                        return Err(RetryError::Exhausted {
                            stage,
                            attempts: attempt,
                            last: error,
                        });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::Gateway;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> GatewayError {
        GatewayError::unavailable(Gateway::StateStore, "connection reset")
    }

    #[test]
    fn test_delays_follow_geometric_backoff() {
        let delays: Vec<Duration> = RetryPolicy::default().delays().collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2250),
                Duration::from_micros(3_375_000),
            ]
        );
    }

    #[test]
    fn test_zero_ceiling_still_makes_one_attempt() {
        let policy = RetryPolicy::with_attempts(0);
        assert_eq!(policy.delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failure() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result = RetryPolicy::with_attempts(5)
            .retry(Stage::Persist, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("persisted")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "persisted");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_ceiling_attempts_with_backoff_between_them() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();
        let started = tokio::time::Instant::now();

        let result: Result<(), RetryError> = RetryPolicy::with_attempts(3)
            .retry(Stage::Fetch, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1000 + 1500));
        match result {
            Err(RetryError::Exhausted { stage, attempts, .. }) => {
                assert_eq!(stage, Stage::Fetch);
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result: Result<(), RetryError> = RetryPolicy::default()
            .retry(Stage::Notify, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::rejected(Gateway::Notifier, "payload too large"))
                }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryable { attempts: 1, .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_each_failed_attempt_before_sleeping() {
        let mut seen = Vec::new();

        let _: Result<(), RetryError> = RetryPolicy::with_attempts(4)
            .retry_with(Stage::DeadLetter, || async { Err(transient()) }, |attempt, _| {
                seen.push(attempt)
            })
            .await;

        assert_eq!(seen, vec![1, 2, 3]);
    }
}
