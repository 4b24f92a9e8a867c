//! # Circuit Breaker Module
//!
//! Stops CAPTCHA OCR from being retried against a broken Tesseract setup.
//! After repeated failures the breaker opens and solves fail fast until the
//! reset timeout elapses.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for OCR operations
///
/// - **Closed**: solves pass through
/// - **Open**: `circuit_breaker_threshold` consecutive failures, solves fail fast
/// - after `circuit_breaker_reset_secs` the breaker closes again on the next check
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before closing again (default: 60s)
///
/// # Thread Safety
///
/// State sits behind a `Mutex`, so one breaker can be shared by every login flow.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Recovery configuration with circuit breaker settings
    ///
    /// # Examples
    ///
    /// ```rust
    /// use portal_bot::circuit_breaker::CircuitBreaker;
    /// use portal_bot::config::RecoveryConfig;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check if circuit breaker is open (blocking requests)
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }

        match state.last_failure {
            Some(last) if last.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) => {
                true
            }
            _ => {
                *state = BreakerState::default();
                false
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_state_transitions() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let circuit_breaker = CircuitBreaker::new(config);

        assert!(!circuit_breaker.is_open());
        circuit_breaker.record_failure();
        assert!(!circuit_breaker.is_open());
        circuit_breaker.record_failure();
        assert!(circuit_breaker.is_open());

        circuit_breaker.record_success();
        assert!(!circuit_breaker.is_open());
    }

    #[test]
    fn test_circuit_breaker_resets_after_timeout() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 1,
            circuit_breaker_reset_secs: 0,
            ..Default::default()
        };
        let circuit_breaker = CircuitBreaker::new(config);

        circuit_breaker.record_failure();
        // Zero reset window: the first check already closes the breaker
        assert!(!circuit_breaker.is_open());
    }
}
