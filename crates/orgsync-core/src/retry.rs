//! Bounded retry with exponential backoff for remote calls.
//!
//! Invoked inline at each call site rather than wrapping whole methods, so
//! retry behavior is visible where the call happens.

use std::thread;
use std::time::Duration;

use crate::error::BackendError;

/// Backoff policy for a single remote operation.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Policy with no waiting, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Delay before the retry following attempt `attempt` (1-based).
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.factor.powi(attempt.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the attempt
/// budget is exhausted. The last error is returned on exhaustion.
pub fn with_backoff<T, F>(policy: &BackoffPolicy, mut op: F) -> Result<T, BackendError>
where
    F: FnMut() -> Result<T, BackendError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt == attempts {
                    if attempt > 1 {
                        tracing::warn!("giving up after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "attempt {attempt}/{attempts} failed: {err}. Retrying in {:.1}s...",
                    delay.as_secs_f64()
                );
                last_err = Some(err);
                thread::sleep(delay);
            }
        }
    }

    // Unreachable: the loop always returns on the final attempt.
    Err(last_err.unwrap_or_else(|| BackendError::Network("retry budget exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_on_first_attempt() {
        let calls = Cell::new(0);
        let result = with_backoff(&BackoffPolicy::immediate(4), || {
            calls.set(calls.get() + 1);
            Ok::<_, BackendError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = with_backoff(&BackoffPolicy::immediate(4), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(BackendError::Network("connection reset".into()))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausts_attempts_and_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_backoff(&BackoffPolicy::immediate(3), || {
            calls.set(calls.get() + 1);
            Err(BackendError::Api {
                status: 500,
                message: "boom".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn non_retryable_errors_fail_fast() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_backoff(&BackoffPolicy::immediate(4), || {
            calls.set(calls.get() + 1);
            Err(BackendError::Auth("token revoked".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = BackoffPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
