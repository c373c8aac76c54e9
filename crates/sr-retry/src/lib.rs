// sr-retry: Retry with exponential backoff and full jitter.
//
// Used by the ingestion publish path, the LLM upstream client, and the
// connector fetchers. The schedule doubles a base delay per attempt and
// draws the actual sleep uniformly from [0, ceiling] (full jitter), so
// synchronized retries from parallel workers fan out instead of stampeding.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub mod status;

pub use status::is_retryable_status;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry schedule: total attempt count and base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub attempts: u32,
    /// Backoff base; attempt n (1-based) has ceiling `base × 2^(n-1)`.
    pub base_delay: Duration,
    /// Hard cap on any single sleep.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff ceiling for a 1-based attempt number (pre-jitter).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ceiling = self.base_delay.saturating_mul(1u32 << exp);
        ceiling.min(self.max_delay)
    }

    /// Draw the jittered sleep for a 1-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let micros = rand::thread_rng().gen_range(0..=ceiling.as_micros() as u64);
        Duration::from_micros(micros)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(4, Duration::from_millis(50))
    }
}

// ---------------------------------------------------------------------------
// Retry context passed to the on-retry callback
// ---------------------------------------------------------------------------

/// Context handed to `on_retry` before each re-attempt sleep.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    /// Total attempts the policy allows.
    pub attempts: u32,
    /// The sleep about to be taken.
    pub delay: Duration,
    pub error: &'a E,
}

// ---------------------------------------------------------------------------
// with_retry
// ---------------------------------------------------------------------------

/// Run `op` until it succeeds or the policy is exhausted, sleeping a
/// jittered backoff between attempts. The last error is propagated.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_notify(policy, |_| {}, &mut op).await
}

/// `with_retry` with an observer invoked before each re-attempt sleep.
pub async fn with_retry_notify<T, E, F, Fut, N>(
    policy: RetryPolicy,
    mut on_retry: N,
    op: &mut F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    N: FnMut(RetryAttempt<'_, E>),
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.attempts {
                    return Err(error);
                }
                let delay = policy.delay(attempt);
                debug!(
                    attempt,
                    attempts = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after failure"
                );
                on_retry(RetryAttempt {
                    attempt,
                    attempts: policy.attempts,
                    delay,
                    error: &error,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, String> = with_retry(fast_policy(4), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<&str, String> = with_retry(fast_policy(4), move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_owned())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_propagates_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), String> = with_retry(fast_policy(3), move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn on_retry_sees_each_failed_attempt() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut op = || async { Err::<(), String>("nope".to_owned()) };
        let result = with_retry_notify(
            fast_policy(3),
            |ctx: RetryAttempt<'_, String>| {
                seen2.lock().unwrap().push((ctx.attempt, ctx.attempts));
            },
            &mut op,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn ceiling_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));
        assert_eq!(policy.ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.ceiling(3), Duration::from_millis(400));
        assert_eq!(policy.ceiling(20), policy.max_delay);
    }

    #[test]
    fn jitter_stays_under_ceiling() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        for attempt in 1..=4 {
            for _ in 0..50 {
                assert!(policy.delay(attempt) <= policy.ceiling(attempt));
            }
        }
    }
}
