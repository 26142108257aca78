//! Resilience patterns for fault-tolerant operation execution.
//!
//! This module provides the two cooperating pieces of Bulwark's failure
//! handling:
//! - **Circuit Breaker**: a registry keyed by `(resource, operation)` that
//!   stops calling a failing dependency for a cooldown period after
//!   repeated failures
//! - **Retry Execution**: configurable backoff strategies (exponential,
//!   linear, fixed, immediate) with jitter, per-attempt timeouts, and
//!   severity-driven retryability
//!
//! The retry executor consults the circuit breaker before every attempt
//! and feeds outcomes back into it, so call sites only interact with
//! [`RetryExecutor`].

pub mod circuit_breaker;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitSnapshot,
    CircuitState, Clock, ConfigError, ConfigResult, MockClock, SystemClock,
};
// Re-export retry types
pub use retry::{
    BackoffStrategy, FallbackOutcome, RetryConfig, RetryConfigBuilder, RetryError, RetryExecutor,
    RetryResult,
};
