//! Circuit breaker guarding the registry endpoint
//!
//! After `failure_threshold` consecutive failures the breaker opens and
//! rejects calls without touching the network. Once `reset_timeout`
//! elapses a single half-open trial is allowed: success closes the
//! breaker, failure re-opens it and restarts the timer.

use crate::config::CircuitBreakerConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// One trial call is allowed through
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker with closed/open/half-open states
///
/// State is process-local and scoped to one gateway client instance;
/// multiple process instances do not share breaker state.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker from configuration
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_seconds),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, transitioning open → half-open when the timeout
    /// has elapsed
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may proceed right now
    ///
    /// In half-open state this admits the trial call; callers must report
    /// the outcome via [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh(&mut inner);
        matches!(inner.state, CircuitState::Closed | CircuitState::HalfOpen)
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state == CircuitState::HalfOpen {
            tracing::info!("Circuit breaker closing after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                // Trial failed, re-open and restart the timer
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("Circuit breaker re-opened after failed trial");
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("Circuit breaker half-open, allowing trial call");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    #[test]
    fn test_opens_at_threshold() {
        let b = breaker(3, 10_000);
        assert!(b.allow_call());

        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow_call());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker(3, 10_000);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_timeout_then_closes_on_success() {
        let b = breaker(1, 0);
        b.record_failure();

        // reset_timeout of zero elapses immediately
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.allow_call());

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let b = breaker(1, 0);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_failure();
        // opened_at was just restarted; with a zero timeout it flips back
        // to half-open on the next read, so assert via the inner counter
        let inner = b.inner.lock().unwrap();
        assert!(inner.opened_at.is_some());
    }

    #[test]
    fn test_stays_open_before_timeout() {
        let b = breaker(1, 60_000);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow_call());
    }
}
