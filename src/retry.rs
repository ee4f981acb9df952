//! Bounded retries around a single upstream request.
//!
//! Rate limiting (HTTP 429) backs off exponentially, transport failures wait
//! a flat unit, everything else is returned to the caller on the spot.
//! There is no jitter, so callers hitting the limit in lockstep retry in
//! lockstep too.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RenewVizError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// One backoff time unit.
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retrying a failed attempt, or `None` if the error is final.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn delay_for(&self, error: &RenewVizError, attempt: u32) -> Option<Duration> {
        match error {
            RenewVizError::RateLimited => Some(self.unit * 2u32.saturating_pow(attempt)),
            RenewVizError::Transport(_) => Some(self.unit),
            _ => None,
        }
    }

    /// Runs `attempt` until it succeeds, fails for good, or attempts run out.
    ///
    /// The closure receives the zero-based attempt index. Transport failures
    /// that survive every attempt surface as `RequestFailed`.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, RenewVizError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RenewVizError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut index = 0;
        loop {
            let error = match attempt(index).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let delay = self.delay_for(&error, index);
            let exhausted = index + 1 >= max_attempts;
            match (delay, error) {
                (Some(delay), error) if !exhausted => {
                    warn!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        index + 1,
                        max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    index += 1;
                }
                (_, RenewVizError::Transport(message)) => {
                    return Err(RenewVizError::RequestFailed {
                        status: None,
                        message,
                    });
                }
                (_, error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_rate_limit_delay_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (0..4)
            .filter_map(|i| policy.delay_for(&RenewVizError::RateLimited, i))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn test_transport_delay_is_flat() {
        let policy = RetryPolicy::default();
        let error = RenewVizError::Transport("reset".into());
        assert_eq!(policy.delay_for(&error, 0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(&error, 5), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_final_errors_have_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(&RenewVizError::AuthenticationFailure, 0), None);
        assert_eq!(policy.delay_for(&RenewVizError::NotFound("x".into()), 0), None);
        let failed = RenewVizError::RequestFailed {
            status: Some(400),
            message: "bad".into(),
        };
        assert_eq!(policy.delay_for(&failed, 0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success_waits_three_units() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = RetryPolicy::new(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(RenewVizError::RateLimited)
                    } else {
                        Ok("payload")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "payload");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3), "waited {waited:?}");
        assert!(waited < Duration::from_secs(4), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_surfaces_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RenewVizError::RateLimited) }
            })
            .await;

        assert!(matches!(result, Err(RenewVizError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> = RetryPolicy::new(5)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RenewVizError::AuthenticationFailure) }
            })
            .await;

        assert!(matches!(result, Err(RenewVizError::AuthenticationFailure)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_become_request_failed() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new(2)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RenewVizError::Transport("connection reset".into())) }
            })
            .await;

        match result {
            Err(RenewVizError::RequestFailed { status, message }) => {
                assert_eq!(status, None);
                assert_eq!(message, "connection reset");
            }
            other => panic!("expected RequestFailed, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(0)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, RenewVizError>(1) }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
