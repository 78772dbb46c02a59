//! Exponential backoff around calls to the generative model.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Budget for the image description call.
    pub const DESCRIBE: RetryPolicy = RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_secs(2),
        max_backoff: Duration::from_secs(15),
        backoff_multiplier: 2.0,
    };

    /// Budget for the image generation call.
    pub const GENERATE: RetryPolicy = RetryPolicy {
        max_retries: 5,
        initial_backoff: Duration::from_secs(3),
        max_backoff: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_multiplier;
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Terminal,
}

/// Only feeds the retry log; both classes share one attempt budget.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    let rate_limited = ["429", "rate limit", "rate-limit", "ratelimit", "quota", "resource_exhausted", "too many requests"]
        .iter()
        .any(|signal| lower.contains(signal));
    if rate_limited {
        ErrorClass::RateLimit
    } else {
        ErrorClass::Terminal
    }
}

/// Runs `operation` until it succeeds or the policy's budget is spent, and
/// returns the last error in the latter case.
pub async fn with_retry<F, Fut, T, E>(label: &str, policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let class = classify(&err.to_string());
                if attempt > policy.max_retries {
                    warn!(call = label, attempts = attempt, class = ?class, error = %err, "retry budget exhausted");
                    return Err(err);
                }

                warn!(
                    call = label,
                    attempt,
                    remaining = policy.max_retries - attempt,
                    class = ?class,
                    delay_ms = backoff.as_millis() as u64,
                    error = %err,
                    "model call failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = policy.next_backoff(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_backoffs() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = Instant::now();

        let result = with_retry("describe", RetryPolicy::DESCRIBE, move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("HTTP 429: RESOURCE_EXHAUSTED")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // 2s then 4s: exactly two delays.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_use_the_same_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), &str> = with_retry("generate", RetryPolicy::GENERATE, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err("invalid argument") }
        })
        .await;

        assert_eq!(result, Err("invalid argument"));
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped_at_max() {
        let start = Instant::now();
        let _: Result<(), &str> = with_retry("generate", RetryPolicy::GENERATE, || async { Err("boom") }).await;
        // 3 + 6 + 12 + 24 + 30
        assert_eq!(start.elapsed(), Duration::from_secs(75));
    }

    #[test]
    fn classifies_rate_limit_signals() {
        assert_eq!(classify("Gemini returned 429 Too Many Requests"), ErrorClass::RateLimit);
        assert_eq!(classify("Quota exceeded for metric"), ErrorClass::RateLimit);
        assert_eq!(classify("safety filter blocked the request"), ErrorClass::Terminal);
    }
}
