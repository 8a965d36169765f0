use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::UpstreamError;

/// Observable state of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls fail immediately without touching the network
    Open,
    /// One probe call is in flight; everyone else is rejected
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker guarding the upstream provider.
///
/// Reaching the failure threshold opens the circuit; while open, calls
/// are rejected until the reset window elapses, after which exactly one
/// half-open probe is admitted. Probe success closes the circuit and
/// resets the counter, probe failure re-opens it.
///
/// All transitions happen under one mutex so a counter increment and the
/// threshold check can never race across concurrent outcome reports.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_after: Duration,
    inner: Mutex<BreakerInner>,
}

fn lock(inner: &Mutex<BreakerInner>) -> MutexGuard<'_, BreakerInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_after: Duration) -> Self {
        Self {
            failure_threshold,
            reset_after,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate a call about to be issued.
    ///
    /// Returns `Ok` when the call may proceed. An open circuit whose
    /// reset window has elapsed flips to half-open and admits the caller
    /// as the single probe.
    pub fn try_acquire(&self) -> Result<(), UpstreamError> {
        let mut inner = lock(&self.inner);

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(UpstreamError::CircuitOpen(CircuitState::HalfOpen)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_after {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("Circuit breaker half-open; admitting probe call");
                    Ok(())
                } else {
                    Err(UpstreamError::CircuitOpen(CircuitState::Open))
                }
            }
        }
    }

    /// Report a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed after successful call");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Report a failed call outcome.
    pub fn record_failure(&self) {
        let mut inner = lock(&self.inner);
        inner.consecutive_failures += 1;

        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen || inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    consecutive_failures = inner.consecutive_failures,
                    probe_failed = reopen,
                    "Circuit breaker opened"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.inner).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_millis(50))
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_opens_at_threshold_and_rejects() {
        let breaker = breaker();
        for _ in 0..5 {
            assert!(breaker.try_acquire().is_ok());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            breaker.try_acquire(),
            Err(UpstreamError::CircuitOpen(CircuitState::Open))
        );
    }

    #[test]
    fn test_success_resets_the_streak() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_admits_exactly_one_probe_after_reset_window() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }

        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // A second caller is rejected while the probe is in flight.
        assert_eq!(
            breaker.try_acquire(),
            Err(UpstreamError::CircuitOpen(CircuitState::HalfOpen))
        );
    }

    #[test]
    fn test_probe_success_closes() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }
}
