//! Bounded retries for booking transactions that lose a serialization race.

use slotwise_core::{BookingError, BookingResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff for re-running a whole transaction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// delay = initial_delay * multiplier^attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or the policy
/// is exhausted. Only storage errors flagged retryable are retried.
pub async fn retry_transaction<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> BookingResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BookingResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(BookingError::Storage(err)) if err.is_retryable() && retries < policy.max_retries => {
                let delay = policy.delay_for_attempt(retries);
                retries += 1;
                warn!(operation, retry = retries, error = %err, "Transaction conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwise_core::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(25));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_serialization_failures_then_succeeds() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };

        let result = retry_transaction(&policy, "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BookingError::Storage(StoreError::SerializationFailure))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_policy_is_exhausted() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };

        let result: BookingResult<()> = retry_transaction(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BookingError::Storage(StoreError::SerializationFailure))
        })
        .await;

        assert_eq!(result, Err(BookingError::Storage(StoreError::SerializationFailure)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: BookingResult<()> = retry_transaction(&RetryPolicy::default(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BookingError::SlotConflict)
        })
        .await;

        assert_eq!(result, Err(BookingError::SlotConflict));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
