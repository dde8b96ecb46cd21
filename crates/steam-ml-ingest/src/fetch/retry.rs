//! Retry policy for outbound requests
//!
//! The decision (`should_retry`) and the wait (`compute_delay`) are pure so
//! they can be reasoned about and tested without a network. [`retrying`] is
//! the only place that loops and sleeps.

use crate::error::{IngestError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default total number of attempts per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default wait before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for a single backoff wait, before jitter
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default jitter, as a fraction of the backoff wait
pub const DEFAULT_JITTER_RATIO: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra random wait of up to this fraction of the backoff
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether the attempt with zero-based index `attempt` that failed with
    /// `error` should be followed by another one.
    pub fn should_retry(&self, error: &IngestError, attempt: u32) -> bool {
        error.is_transient() && attempt.saturating_add(1) < self.max_attempts
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, jitter_ratio * backoff]`.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if self.jitter_ratio <= 0.0 || backoff.is_zero() {
            return backoff;
        }

        let fraction = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        backoff + backoff.mul_f64(fraction)
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy gives up.
///
/// `op` receives the zero-based attempt index. A transient error that
/// exhausts the policy is returned with its attempt count filled in.
pub async fn retrying<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(label, attempts = attempt + 1, "Request succeeded after retry");
                }
                return Ok(value);
            },
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = policy.compute_delay(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => return Err(err.with_attempts(attempt + 1)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter_ratio: 0.0,
        }
    }

    fn permanent() -> IngestError {
        IngestError::PermanentRequest {
            url: "http://api/x".to_string(),
            status: 404,
            message: "not found".to_string(),
        }
    }

    #[test]
    fn test_should_retry_only_transient_within_budget() {
        let policy = fast_policy(3);
        let transient = IngestError::transient("http://api/x", "HTTP 503");

        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&transient, 1));
        assert!(!policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&permanent(), 0));
        assert!(!RetryPolicy::no_retry().should_retry(&transient, 0));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_compute_delay_jitter_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_ratio: 0.5,
            ..RetryPolicy::default()
        };

        for _ in 0..200 {
            let delay = policy.compute_delay(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_retrying_recovers_from_transient() {
        let calls = Cell::new(0u32);
        let result = retrying(&fast_policy(5), "test", |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 2 {
                    Err(IngestError::transient("http://api/x", "HTTP 503"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retrying_reports_attempts_on_exhaustion() {
        let calls = Cell::new(0u32);
        let err = retrying(&fast_policy(3), "test", |_| {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(IngestError::transient("http://api/x", "timed out")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        assert!(matches!(err, IngestError::TransientNetwork { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_retrying_never_repeats_permanent() {
        let calls = Cell::new(0u32);
        let err = retrying(&fast_policy(5), "test", |_| {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(permanent()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert_eq!(err.kind(), "PermanentRequestError");
    }
}
