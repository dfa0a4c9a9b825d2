//! Per-endpoint circuit breaker.
//!
//! CLOSED -> OPEN after `failure_threshold` consecutive failures.
//! OPEN rejects until `reset_timeout` has elapsed since the last failure; the
//! next attempt moves to HALF_OPEN and is let through.
//! HALF_OPEN admits up to `half_open_max_calls` trials; that many successes
//! close the breaker, any failure re-opens it.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{PredictError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 2,
        }
    }
}

/// Read-only view for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub endpoint: String,
    pub state: BreakerState,
    pub failures: u32,
    /// Seconds since the last recorded failure, if any.
    pub last_failure_secs_ago: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
    half_open_successes: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                half_open_calls: 0,
                half_open_successes: 0,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Ask permission for one call. Rejections carry `CircuitOpen`.
    pub fn try_acquire(&self) -> Result<()> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);

                if elapsed > self.config.reset_timeout {
                    info!("Circuit for {} moving to HALF_OPEN", self.endpoint);
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_calls = 1;
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => inner.failures = 0,
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    info!("Circuit for {} CLOSED after trial calls", self.endpoint);
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.last_failure = None;
                    inner.half_open_calls = 0;
                    inner.half_open_successes = 0;
                }
            }
            // A call admitted before the breaker tripped finished late.
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(now);

        match inner.state {
            BreakerState::Closed => {
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit for {} OPEN after {} consecutive failures",
                        self.endpoint, inner.failures
                    );
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                warn!("Trial call to {} failed, circuit re-OPENED", self.endpoint);
                inner.state = BreakerState::Open;
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failures: inner.failures,
            last_failure_secs_ago: inner.last_failure.map(|at| at.elapsed().as_secs()),
        }
    }

    fn open_error(&self) -> PredictError {
        PredictError::CircuitOpen {
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "market-data",
            BreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(10),
                half_open_max_calls: 2,
            },
        )
    }

    fn trip(cb: &CircuitBreaker, now: Instant) {
        for _ in 0..3 {
            cb.try_acquire_at(now).unwrap();
            cb.record_failure_at(now);
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker();
        let now = Instant::now();

        cb.record_failure_at(now);
        cb.record_failure_at(now);
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_failure_at(now);
        assert_eq!(cb.state(), BreakerState::Open);

        let err = cb.try_acquire_at(now + Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PredictError::CircuitOpen { .. }));
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker();
        let now = Instant::now();

        cb.record_failure_at(now);
        cb.record_failure_at(now);
        cb.record_success();
        cb.record_failure_at(now);
        cb.record_failure_at(now);

        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        // Exactly at the timeout is still OPEN.
        assert!(cb.try_acquire_at(now + Duration::from_secs(10)).is_err());

        assert!(cb.try_acquire_at(now + Duration::from_secs(11)).is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_successes_close() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let later = now + Duration::from_secs(11);
        cb.try_acquire_at(later).unwrap();
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.try_acquire_at(later).unwrap();
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().failures, 0);
    }

    #[test]
    fn test_half_open_limits_trial_calls() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let later = now + Duration::from_secs(11);
        assert!(cb.try_acquire_at(later).is_ok());
        assert!(cb.try_acquire_at(later).is_ok());
        assert!(cb.try_acquire_at(later).is_err());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker();
        let now = Instant::now();
        trip(&cb, now);

        let later = now + Duration::from_secs(11);
        cb.try_acquire_at(later).unwrap();
        cb.record_failure_at(later);
        assert_eq!(cb.state(), BreakerState::Open);

        // The reset timeout restarts from the trial failure.
        assert!(cb.try_acquire_at(later + Duration::from_secs(5)).is_err());
        assert!(cb.try_acquire_at(later + Duration::from_secs(11)).is_ok());
    }
}
