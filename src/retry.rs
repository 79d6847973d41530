/// Retry with exponential backoff for blocking calls.
///
/// Network calls to the open data API are retried when the failure looks
/// transient (timeouts, refused connections, 5xx). Anything else is handed
/// back to the caller on the first occurrence.

use crate::config::RetryConfig;
use crate::model::KnmiError;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for KnmiError {
    fn is_retryable(&self) -> bool {
        match self {
            KnmiError::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
            }
            KnmiError::Http { status, .. } => *status >= 500 || *status == 429,
            KnmiError::Stream(_) => true,
            // Local disk trouble needs an operator
            KnmiError::Write { .. } => false,
            KnmiError::NoFiles(_) => true,
        }
    }
}

/// Backoff schedule derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and one-shot calls.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of
    /// attempts. `on_failure` sees every failed attempt before the decision.
    pub fn run<T, E, F, L>(&self, mut operation: F, mut on_failure: L) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        L: FnMut(u32, &E),
        E: IsRetryable + std::fmt::Display,
    {
        let mut attempt = 1;
        let mut delay = self.initial_delay;

        loop {
            match operation() {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    on_failure(attempt, &e);
                    if !e.is_retryable() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    tracing::debug!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );

                    let wait = if self.jitter { add_jitter(delay) } else { delay };
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }

                    let next =
                        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
                            .unwrap_or(self.max_delay);
                    delay = next.min(self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Spreads the delay uniformly between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    #[test]
    fn test_success_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, TestError> = RetryPolicy::immediate(3).run(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Err(TestError::Transient) } else { Ok(7) }
            },
            |_, _| {},
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> = RetryPolicy::immediate(2).run(
            || {
                calls.set(calls.get() + 1);
                Err(TestError::Transient)
            },
            |_, _| {},
        );
        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let seen = Cell::new(0);
        let result: Result<(), TestError> = RetryPolicy::immediate(5).run(
            || Err(TestError::Permanent),
            |attempt, _| seen.set(attempt),
        );
        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_unrepresentable_backoff_falls_back_to_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: -2.0,
            jitter: false,
        };
        let calls = Cell::new(0);
        let result: Result<(), TestError> = policy.run(
            || {
                calls.set(calls.get() + 1);
                Err(TestError::Transient)
            },
            |_, _| {},
        );
        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_jitter_stays_within_double_delay() {
        let base = Duration::from_millis(100);
        let slack = Duration::from_micros(1);
        for _ in 0..50 {
            let jittered = add_jitter(base);
            assert!(jittered + slack >= base && jittered <= base * 2 + slack);
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let forbidden = KnmiError::Http { status: 403, url: "u".into() };
        let unavailable = KnmiError::Http { status: 503, url: "u".into() };
        assert!(!forbidden.is_retryable());
        assert!(unavailable.is_retryable());
    }
}
