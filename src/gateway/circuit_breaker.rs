// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Stops forwarding to a remote backend that keeps failing.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Backend is failing, requests are rejected immediately
// - Half-Open: Cool-down elapsed, trial requests decide recovery
//
// A rejected request is never retried; the caller gets a gateway error.
//
// ============================================================================

use crate::config::CircuitBreakerConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for one backend. Clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker is open - service is unavailable")]
    CircuitOpen,
}

impl CircuitBreaker {
    pub fn new(config: Arc<CircuitBreakerConfig>) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
        }
    }

    /// Ok(()) if the request may proceed
    pub async fn allow_request(&self) -> Result<(), CircuitBreakerError> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let cool_down = Duration::from_secs(self.config.timeout_secs);
                match inner.opened_at {
                    Some(opened) if opened.elapsed() >= cool_down => {
                        inner.state = CircuitState::HalfOpen;
                        inner.successes = 0;
                        tracing::info!("Circuit breaker transitioning to half-open");
                        Ok(())
                    }
                    _ => Err(CircuitBreakerError::CircuitOpen),
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                    tracing::info!("Circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failure_count = inner.failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened due to failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.successes = 0;
                tracing::warn!("Circuit breaker reopened after failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(Arc::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 2,
            success_threshold: 1,
            timeout_secs,
        }))
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = breaker(60);
        breaker.record_failure().await;
        assert!(breaker.allow_request().await.is_ok());

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(breaker.allow_request().await.is_err());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = breaker(60);
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_trial_closes_or_reopens() {
        let breaker = breaker(0);
        breaker.record_failure().await;
        breaker.record_failure().await;

        assert!(breaker.allow_request().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        assert!(breaker.allow_request().await.is_ok());
        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn disabled_breaker_always_allows() {
        let breaker = CircuitBreaker::new(Arc::new(CircuitBreakerConfig {
            enabled: false,
            failure_threshold: 1,
            success_threshold: 1,
            timeout_secs: 60,
        }));
        breaker.record_failure().await;
        assert!(breaker.allow_request().await.is_ok());
    }
}
