//! Resilience patterns for fault-tolerant task execution
//!
//! This module provides:
//! - [`circuit_breaker`]: Circuit breaker pattern
//! - [`fallback`]: Fallback substitution and per-session breakers

pub mod circuit_breaker;
pub mod fallback;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{FallbackPolicy, OpenCircuit, SessionBreaker};
