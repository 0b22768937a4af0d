//! Circuit Breaker Pattern
//!
//! Skips a task body that keeps failing for a session.
//!
//! # States
//!
//! - **Closed**: Normal operation, the body is invoked
//! - **Open**: `failure_threshold` consecutive failures; the body is skipped
//!   and its fallback used until the cooldown elapses
//! - **Half-Open**: Cooldown elapsed; a single invocation is let through as
//!   a trial while concurrent callers stay short-circuited. Success closes
//!   the circuit, failure reopens it for another cooldown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::BreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Time spent open before a real attempt is allowed again
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
        }
    }
}

/// Circuit breaker for one (session, task) pair
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    /// Set while the half-open trial is running
    trial_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    /// Current state (after applying an elapsed cooldown)
    pub fn state(&self) -> CircuitState {
        self.check_recovery_timeout();
        *self.state.read()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Whether the body may be invoked now.
    ///
    /// In half-open state only the first caller is admitted; it must report
    /// back through `record_success` or `record_failure`.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self
                .trial_in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
        }
    }

    /// Time left before a real attempt is allowed, if open
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if *self.state.read() != CircuitState::Open {
            return None;
        }
        let opened_at = (*self.opened_at.read())?;
        Some(self.config.cooldown.saturating_sub(opened_at.elapsed()))
    }

    /// Transition Open → HalfOpen once the cooldown elapsed
    fn check_recovery_timeout(&self) {
        if *self.state.read() != CircuitState::Open {
            return;
        }
        let opened_at = *self.opened_at.read();
        let elapsed = opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);

        if elapsed >= self.config.cooldown {
            let mut state_guard = self.state.write();
            if *state_guard == CircuitState::Open {
                *state_guard = CircuitState::HalfOpen;
            }
        }
    }

    /// Record a successful invocation; closes the circuit
    pub fn record_success(&self) {
        let mut state_guard = self.state.write();
        *state_guard = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
        *self.opened_at.write() = None;
        self.trial_in_flight.store(false, Ordering::SeqCst);
    }

    /// Record a failed invocation; returns the resulting state
    pub fn record_failure(&self) -> CircuitState {
        let mut state_guard = self.state.write();
        let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;

        let open = match *state_guard {
            CircuitState::Closed => failures >= self.config.failure_threshold,
            // A failed trial reopens immediately
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if open {
            *state_guard = CircuitState::Open;
            *self.opened_at.write() = Some(Instant::now());
        }
        self.trial_in_flight.store(false, Ordering::SeqCst);
        *state_guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cooldown(Duration::from_millis(cooldown_ms)),
        )
    }

    #[test]
    fn test_starts_closed() {
        let cb = breaker(3, 1000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
        assert!(cb.remaining_cooldown().is_none());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 1000);
        assert_eq!(cb.record_failure(), CircuitState::Closed);
        assert_eq!(cb.record_failure(), CircuitState::Closed);
        assert_eq!(cb.record_failure(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert!(cb.remaining_cooldown().is_some());
    }

    #[test]
    fn test_success_resets_count() {
        let cb = breaker(3, 1000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let cb = breaker(1, 20);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(2, 20);
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(cb.record_failure(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_half_open_success_closes() {
        let cb = breaker(1, 20);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cb.allow_request());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let cb = breaker(1, 20);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(40));

        assert!(cb.allow_request());
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // A failed trial reopens; the next cooldown admits one new trial
        assert_eq!(cb.record_failure(), CircuitState::Open);
        assert!(!cb.allow_request());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cb.allow_request());
        assert!(!cb.allow_request());

        cb.record_success();
        assert!(cb.allow_request());
        assert!(cb.allow_request());
    }

    #[test]
    fn test_config_from_breaker_settings() {
        let config = CircuitBreakerConfig::from(&BreakerConfig {
            failure_threshold: 0,
            cooldown_secs: 7,
        });
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cooldown, Duration::from_secs(7));
    }
}
