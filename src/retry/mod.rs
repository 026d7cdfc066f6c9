//! Retry executor with exponential backoff and jitter
//!
//! Everything that calls the registry goes through [`retry_with_backoff`].
//! The delay for attempt `n` is `min(base_delay * multiplier^(n-1),
//! max_delay)` with ±25% jitter so synchronized workers don't hammer a
//! recovering endpoint in lockstep. Whether an error is worth retrying is
//! decided by a predicate; the read and write presets differ only in their
//! base delay and in the write preset refusing to retry validation and
//! conflict statuses.

pub mod circuit;

use crate::config::RetryConfig;
use crate::domain::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

pub use circuit::{CircuitBreaker, CircuitState};

/// Retry policy for one class of operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Initial backoff delay
    pub base_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
    /// Delay ceiling
    pub max_delay: Duration,
    /// Name used in log fields
    pub operation_name: String,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig, operation_name: impl Into<String>) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            operation_name: operation_name.into(),
        }
    }

    /// Read preset: 1s base delay
    pub fn read(operation_name: impl Into<String>) -> Self {
        Self::from_config(&RetryConfig::read_default(), operation_name)
    }

    /// Write preset: 2s base delay
    pub fn write(operation_name: impl Into<String>) -> Self {
        Self::from_config(&RetryConfig::write_default(), operation_name)
    }

    /// Backoff delay before retry `attempt` (1-based), without jitter
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.base_delay.as_millis() as f64 * exp) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Apply ±25% jitter to a delay
fn with_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((millis * factor) as u64)
}

/// Retry predicate for read (search) operations
///
/// Transient transport failures and 408/429/503/5xx statuses are retried;
/// everything else propagates immediately.
pub fn read_should_retry(err: &GatewayError) -> bool {
    if err.is_transport() {
        return true;
    }
    match err.status() {
        Some(status) => matches!(status, 408 | 429 | 503) || (500..600).contains(&status),
        None => false,
    }
}

/// Retry predicate for write (create/bundle) operations
///
/// Same as reads, except validation and conflict statuses are never
/// retried: resending an invalid or conflicting payload cannot succeed.
pub fn write_should_retry(err: &GatewayError) -> bool {
    if matches!(err.status(), Some(400) | Some(409) | Some(422)) {
        return false;
    }
    read_should_retry(err)
}

/// Execute an operation with retry and exponential backoff
///
/// The operation is attempted `max_retries + 1` times in total. When
/// `should_retry` returns false, or retries are exhausted, the last error
/// propagates unchanged.
///
/// # Arguments
///
/// * `policy` - Retry tuning for this operation class
/// * `should_retry` - Predicate deciding whether an error is transient
/// * `operation` - Factory producing a fresh future per attempt
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    should_retry: impl Fn(&GatewayError) -> bool,
    operation: F,
) -> Result<T, GatewayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;
                if attempt > policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }

                let delay = with_jitter(policy.delay_for_attempt(attempt));

                tracing::warn!(
                    operation = %policy.operation_name,
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            operation_name: "test".to_string(),
        }
    }

    fn status_err(status: u16) -> GatewayError {
        GatewayError::HttpStatus {
            status,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), read_should_retry, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, GatewayError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries_then_propagates() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&fast_policy(3), read_should_retry, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Timeout("slow".to_string()))
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Timeout(_))));
        // 1 initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_client_error_makes_exactly_one_call() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&fast_policy(3), read_should_retry, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status_err(400))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), read_should_retry, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::ConnectionFailed("refused".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test_case(408, true; "request timeout")]
    #[test_case(429, true; "too many requests")]
    #[test_case(503, true; "service unavailable")]
    #[test_case(500, true; "server error")]
    #[test_case(502, true; "bad gateway")]
    #[test_case(400, false; "bad request")]
    #[test_case(404, false; "not found")]
    #[test_case(409, false; "conflict")]
    #[test_case(422, false; "unprocessable")]
    fn test_read_retry_predicate(status: u16, expected: bool) {
        assert_eq!(read_should_retry(&status_err(status)), expected);
    }

    #[test]
    fn test_read_retry_predicate_transport() {
        assert!(read_should_retry(&GatewayError::ConnectionFailed(
            "dns".to_string()
        )));
        assert!(read_should_retry(&GatewayError::Timeout("10s".to_string())));
        assert!(!read_should_retry(&GatewayError::InvalidResponse(
            "bad json".to_string()
        )));
    }

    #[test_case(400; "bad request")]
    #[test_case(409; "conflict")]
    #[test_case(422; "unprocessable")]
    fn test_write_retry_excludes_validation_statuses(status: u16) {
        assert!(!write_should_retry(&status_err(status)));
    }

    #[test]
    fn test_write_retry_still_retries_server_errors() {
        assert!(write_should_retry(&status_err(503)));
        assert!(write_should_retry(&GatewayError::Timeout("t".to_string())));
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(1_000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            operation_name: "test".to_string(),
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4_000));
        // 2^9 seconds would be 512s, capped at 30s
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(1_000);
        for _ in 0..100 {
            let jittered = with_jitter(delay).as_millis() as u64;
            assert!((750..=1_250).contains(&jittered), "jittered = {jittered}");
        }
    }
}
