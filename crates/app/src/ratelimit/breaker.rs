//! Circuit breaker specialized for the rate limiter.
//!
//! Differences from the generic breaker: the reset timeout carries ±20%
//! per-process jitter so replicas do not probe a recovering store in
//! lockstep, half-open admits exactly one probe at a time, and closing
//! requires three consecutive probe successes.

use std::{
    future::Future,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};
use veritag::breaker::{BreakerState, CircuitOpen};

const FAILURE_THRESHOLD: u32 = 5;
const BASE_RESET_TIMEOUT: Duration = Duration::from_secs(10);
const RESET_JITTER_RATIO: f64 = 0.2;
const HALF_OPEN_MAX_ATTEMPTS: u32 = 1;
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 3;

/// Snapshot of breaker counters for observability.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBreakerMetrics {
    pub state: BreakerState,
    pub total_requests: u64,
    pub total_errors: u64,
    pub half_open_probes: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_state_change: Instant,
    half_open_attempts: u32,
    half_open_successes: u32,
    total_requests: u64,
    total_errors: u64,
    half_open_probes: u64,
}

#[derive(Debug)]
pub struct RateLimitBreaker {
    inner: Mutex<BreakerInner>,
    reset_timeout: Duration,
}

impl Default for RateLimitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitBreaker {
    /// Create a breaker with a jittered reset timeout drawn once for this
    /// process instance.
    #[must_use]
    pub fn new() -> Self {
        let jitter = BASE_RESET_TIMEOUT.mul_f64(RESET_JITTER_RATIO);
        let reset_timeout = BASE_RESET_TIMEOUT - jitter + jitter.mul_f64(2.0 * rand::random::<f64>());

        Self::with_reset_timeout(reset_timeout)
    }

    #[must_use]
    pub fn with_reset_timeout(reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_state_change: Instant::now(),
                half_open_attempts: 0,
                half_open_successes: 0,
                total_requests: 0,
                total_errors: 0,
                half_open_probes: 0,
            }),
            reset_timeout,
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    #[must_use]
    pub fn metrics(&self) -> RateLimitBreakerMetrics {
        let inner = self.lock();

        RateLimitBreakerMetrics {
            state: inner.state,
            total_requests: inner.total_requests,
            total_errors: inner.total_errors,
            half_open_probes: inner.half_open_probes,
        }
    }

    /// Check admission. While half open only one probe is admitted at a
    /// time; everything else fast-fails.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.lock();

        inner.total_requests += 1;

        if inner.state == BreakerState::Open {
            if inner.last_state_change.elapsed() > self.reset_timeout {
                inner.state = BreakerState::HalfOpen;
                inner.last_state_change = Instant::now();
                inner.half_open_attempts = 0;
                inner.half_open_successes = 0;
                info!("rate limit circuit breaker: open -> half-open");
            } else {
                return Err(CircuitOpen);
            }
        }

        if inner.state == BreakerState::HalfOpen {
            if inner.half_open_attempts >= HALF_OPEN_MAX_ATTEMPTS {
                debug!(
                    attempts = inner.half_open_attempts,
                    max = HALF_OPEN_MAX_ATTEMPTS,
                    "rate limit circuit breaker: half-open probe limit reached"
                );
                return Err(CircuitOpen);
            }

            inner.half_open_attempts += 1;
            inner.half_open_probes += 1;
        }

        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();

        inner.failures = 0;

        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;

            if inner.half_open_successes >= HALF_OPEN_SUCCESS_THRESHOLD {
                inner.state = BreakerState::Closed;
                inner.last_state_change = Instant::now();
                inner.half_open_attempts = 0;
                inner.half_open_successes = 0;
                info!(
                    successes_required = HALF_OPEN_SUCCESS_THRESHOLD,
                    "rate limit circuit breaker: half-open -> closed"
                );
            } else {
                // Free the probe slot for the next test request.
                inner.half_open_attempts = 0;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();

        inner.total_errors += 1;
        inner.failures += 1;

        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes = 0;
            inner.state = BreakerState::Open;
            inner.last_state_change = Instant::now();
            error!("rate limit circuit breaker re-opened by half-open failure");
            return;
        }

        if inner.failures >= FAILURE_THRESHOLD && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            inner.last_state_change = Instant::now();
            error!(failures = inner.failures, "rate limit circuit breaker opened");
        }
    }

    /// Run an async call under breaker protection; the future is polled with
    /// no lock held.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<Result<T, E>, CircuitOpen>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        let result = f().await;

        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }

        Ok(result)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
