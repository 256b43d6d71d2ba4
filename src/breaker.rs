//! Generic three-state circuit breaker.
//!
//! Guards any fallible dependency call. The mutex is held only across state
//! inspection and mutation; the protected call always runs outside the lock
//! so a slow dependency cannot serialize its callers.

use std::{
    future::Future,
    sync::Mutex,
    time::{Duration, Instant},
};

use thiserror::Error;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Distinguished fast-fail error returned while the breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpen;

/// Error returned by [`Breaker::execute`] and [`Breaker::execute_async`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct Breaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    half_open_max: u32,
    reset_timeout: Duration,
}

impl Breaker {
    /// Create a breaker that opens after `threshold` consecutive failures,
    /// admits up to `half_open_max` probes once `reset_timeout` has elapsed,
    /// and closes again after `half_open_max` consecutive probe successes.
    #[must_use]
    pub fn new(threshold: u32, half_open_max: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
            }),
            threshold,
            half_open_max,
            reset_timeout,
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Check admission. Transitions Open → HalfOpen once the reset timeout
    /// has elapsed since the last failure.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed_reset = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.reset_timeout);

                if elapsed_reset {
                    inner.state = BreakerState::HalfOpen;
                    inner.successes = 0;
                    Ok(())
                } else {
                    Err(CircuitOpen)
                }
            }
            BreakerState::HalfOpen => {
                if inner.successes < self.half_open_max {
                    Ok(())
                } else {
                    Err(CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();

        if inner.state == BreakerState::HalfOpen {
            inner.successes += 1;

            if inner.successes >= self.half_open_max {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
            }
        }

        if inner.state == BreakerState::Closed {
            inner.failures = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();

        inner.failures += 1;
        inner.last_failure = Some(Instant::now());

        if inner.state == BreakerState::Closed && inner.failures >= self.threshold {
            inner.state = BreakerState::Open;
        }

        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Open;
        }
    }

    /// Run `f` under breaker protection.
    pub fn execute<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.try_acquire().map_err(|_| BreakerError::Open)?;

        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Run an async `f` under breaker protection. The future is polled with
    /// no lock held.
    pub async fn execute_async<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire().map_err(|_| BreakerError::Open)?;

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(BreakerError::Inner(error))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned lock can only mean a panic inside these short critical
        // sections; the state machine remains consistent, so continue.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
