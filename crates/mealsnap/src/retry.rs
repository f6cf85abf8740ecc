//! Resilient call adapter: bounded retry with exponential backoff, with a
//! blocking variant that offloads the operation to the blocking thread pool so
//! non-async SDK calls never stall the event loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry schedule for one call site. Immutable; each call site may supply its
/// own. `max_attempts` counts total tries (first try + retries).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt `attempt` (1-based):
    /// `initial_delay * backoff_multiplier^(attempt-1)`. No jitter, no cap;
    /// callers choosing large values are responsible for bounding total latency.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        self.initial_delay.mul_f64(self.backoff_multiplier.powi(exp))
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping the backoff delay
/// between attempts. Surfaces the last observed error. Errors are not
/// inspected: permanent failures burn the whole budget just like transient
/// ones.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay_before(attempt)).await;
                }
            }
        }
    }
    // attempts >= 1, so at least one iteration ran and set last_err.
    Err(last_err.expect("at least one attempt"))
}

/// Like [`run_with_retry`] but for blocking operations (storage or database
/// SDK calls without native async support). Each attempt runs on the blocking
/// thread pool; the caller suspends until it completes.
pub async fn run_blocking_with_retry<T, E, F>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let op = Arc::new(op);
    run_with_retry(policy, || {
        let op = op.clone();
        async move {
            match tokio::task::spawn_blocking(move || op()).await {
                Ok(result) => result,
                // Joining only fails when the closure panicked; surface that
                // panic in the caller instead of inventing an error value.
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_k_failures_with_k_plus_one_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<u32, &str> = run_with_retry(&quick_policy(5), || {
            let calls = calls_in.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    Err("boom")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<(), String> = run_with_retry(&quick_policy(3), || {
            let calls = calls_in.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            }
        })
        .await;
        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blocking_variant_retries_and_returns() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<&str, &str> = run_blocking_with_retry(&quick_policy(4), move || {
            let n = calls_in.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err("not yet")
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn backoff_schedule_is_pure_exponential() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(200));
        assert_eq!(policy.delay_before(2), Duration::from_millis(400));
        assert_eq!(policy.delay_before(3), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_monotone_for_multiplier_at_least_one() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(50),
            backoff_multiplier: 1.5,
        };
        for attempt in 1..5 {
            assert!(policy.delay_before(attempt + 1) >= policy.delay_before(attempt));
        }
    }
}
