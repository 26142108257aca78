//! Shared resilience primitives for the Bulwark crates.
//!
//! This crate provides the failure-handling building blocks used across the
//! workspace:
//! - `error`: severity classification and a rolling history of failure
//!   records
//! - `resilience`: retry execution with configurable backoff strategies and
//!   a circuit breaker keyed by `(resource, operation)`
//!
//! All shared state (the error log, the circuit-breaker registry) is
//! constructed explicitly and passed in by the caller; there are no global
//! registries.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;

// Re-export commonly used types for convenience
// ------------------------------
pub use error::{classify, classify_error, ErrorLog, ErrorRecord, Severity};
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitSnapshot, CircuitState, Clock, ConfigError, ConfigResult, FallbackOutcome, MockClock,
    RetryConfig, RetryConfigBuilder, RetryError, RetryExecutor, RetryResult, SystemClock,
};
