//! Retry execution with configurable backoff and circuit-breaker
//! integration.
//!
//! [`RetryExecutor`] wraps an async operation identified by an
//! `(operation, resource)` pair. Before every attempt it consults the
//! circuit breaker and fails fast when the key's circuit is open. Each
//! caught failure is classified, appended to the shared error history, and
//! counted against the breaker; transient failures are retried with the
//! configured backoff until the retry budget is exhausted.
//!
//! Every attempt runs under a per-attempt timeout so a hung operation
//! cannot block the executor indefinitely, and in-flight retries honor a
//! caller-supplied cancellation token.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{classify_error, ErrorLog, ErrorRecord, Severity};

use super::circuit_breaker::{CircuitBreaker, Clock, ConfigError, ConfigResult, SystemClock};

/// Cap on the exponent used for exponential backoff to prevent overflow.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Relative magnitude of the jitter applied to computed delays.
const JITTER_FACTOR: f64 = 0.1;

//==============================================================================
// Backoff Configuration
//==============================================================================

/// Strategy for computing the delay between consecutive retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base_delay * multiplier^attempt`
    Exponential,
    /// `base_delay * (attempt + 1)`
    Linear,
    /// `base_delay` for every attempt.
    Fixed,
    /// No delay between attempts.
    Immediate,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Exponential => write!(f, "exponential"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Fixed => write!(f, "fixed"),
            BackoffStrategy::Immediate => write!(f, "immediate"),
        }
    }
}

/// Configuration for retry behavior.
///
/// Immutable once built; one instance may be shared across many operation
/// invocations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Base delay fed into the backoff formula.
    pub base_delay: Duration,
    /// Upper bound applied to every computed delay.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Whether to perturb computed delays by ±10%.
    pub jitter: bool,
    /// Multiplier for the exponential strategy.
    pub backoff_multiplier: f64,
    /// Per-attempt timeout; `None` disables the bound.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            backoff_multiplier: 2.0,
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backoff_multiplier <= 0.0 {
            return Err(ConfigError::Invalid {
                message: "backoff_multiplier must be greater than 0".to_string(),
            });
        }

        if self.base_delay > self.max_delay {
            return Err(ConfigError::Invalid {
                message: format!(
                    "base_delay ({:?}) cannot be greater than max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            });
        }

        Ok(())
    }

    /// Delay for the given attempt before clamping and jitter.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => {
                let base_millis = self.base_delay.as_millis() as f64;
                let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
                let millis = base_millis * self.backoff_multiplier.powi(exponent as i32);
                Duration::from_millis(millis.min(u64::MAX as f64) as u64)
            }
        }
    }

    /// Delay for the given attempt: [`Self::raw_delay`] clamped to
    /// `max_delay`, then perturbed by ±10% when jitter is enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let clamped = self.raw_delay(attempt).min(self.max_delay);
        if !self.jitter || clamped.is_zero() {
            return clamped;
        }

        let millis = clamped.as_millis() as f64;
        let offset = rand::thread_rng().gen_range(-JITTER_FACTOR..=JITTER_FACTOR);
        Duration::from_millis((millis * (1.0 + offset)).max(0.0) as u64)
    }
}

/// Builder for [`RetryConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = Some(timeout);
        self
    }

    pub fn no_attempt_timeout(mut self) -> Self {
        self.config.attempt_timeout = None;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Errors
//==============================================================================

/// Errors surfaced by [`RetryExecutor::execute`].
///
/// `CircuitOpen` is deliberately distinct from the failure variants so
/// callers can tell "the operation failed" apart from "we refused to even
/// try".
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The circuit for this key is open; the operation was not invoked.
    #[error("Circuit open for '{resource_id}/{operation}', failing fast")]
    CircuitOpen { resource_id: String, operation: String },

    /// The error was classified as non-retryable and surfaced immediately.
    #[error("Operation '{operation}' failed with non-retryable ({severity}) error: {source}")]
    NonRetryable {
        operation: String,
        severity: Severity,
        #[source]
        source: E,
    },

    /// Every attempt failed; the last error is preserved unchanged.
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// The final attempt exceeded the per-attempt timeout.
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    AttemptTimeout { operation: String, timeout: Duration },

    /// The caller's cancellation token fired.
    #[error("Operation '{operation}' cancelled")]
    Cancelled { operation: String },
}

/// Result type for retry operations.
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of an execution that substitutes a labeled fallback on failure.
///
/// Downstream routing should match on this exhaustively instead of
/// inspecting strings; a substituted value always carries the error that
/// caused it.
#[derive(Debug)]
pub enum FallbackOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The operation produced its own value.
    Value(T),
    /// The operation failed; the caller-provided fallback was substituted.
    Fallback { value: T, error: RetryError<E> },
}

impl<T, E> FallbackOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the fallback value was substituted.
    pub fn is_fallback(&self) -> bool {
        matches!(self, FallbackOutcome::Fallback { .. })
    }

    /// Consume the outcome and return the value, fallback or not.
    pub fn into_value(self) -> T {
        match self {
            FallbackOutcome::Value(value) => value,
            FallbackOutcome::Fallback { value, .. } => value,
        }
    }
}

enum AttemptOutcome<T, E> {
    Success(T),
    Failed(E),
    TimedOut(Duration),
}

//==============================================================================
// Executor
//==============================================================================

/// Executes operations with retry, classification, and circuit-breaker
/// protection.
///
/// The executor holds the shared error history and circuit-breaker registry
/// explicitly; construct one per process (or component) and clone it per
/// call site. Per-call-site configuration goes through
/// [`Self::execute_with_config`] rather than a second executor.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: Clock = SystemClock> {
    config: RetryConfig,
    breaker: Arc<CircuitBreaker<C>>,
    history: Arc<ErrorLog>,
}

impl<C: Clock> RetryExecutor<C> {
    /// Create an executor over the given shared state.
    pub fn new(config: RetryConfig, breaker: Arc<CircuitBreaker<C>>, history: Arc<ErrorLog>) -> Self {
        Self { config, breaker, history }
    }

    /// Create an executor with the default retry configuration.
    pub fn with_defaults(breaker: Arc<CircuitBreaker<C>>, history: Arc<ErrorLog>) -> Self {
        Self::new(RetryConfig::default(), breaker, history)
    }

    /// The executor's default configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The shared circuit-breaker registry.
    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    /// The shared error history.
    pub fn history(&self) -> &Arc<ErrorLog> {
        &self.history
    }

    /// Execute an operation with the executor's default configuration.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: &str,
        resource_id: &str,
        f: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, resource_id, &self.config, f, &CancellationToken::new()).await
    }

    /// Execute an operation with a per-call configuration override.
    pub async fn execute_with_config<F, Fut, T, E>(
        &self,
        operation: &str,
        resource_id: &str,
        config: &RetryConfig,
        f: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, resource_id, config, f, &CancellationToken::new()).await
    }

    /// Execute an operation, aborting promptly when the caller's token is
    /// cancelled (checked before each attempt and during backoff sleeps).
    pub async fn execute_cancellable<F, Fut, T, E>(
        &self,
        operation: &str,
        resource_id: &str,
        f: F,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, resource_id, &self.config, f, cancel).await
    }

    /// Execute an operation, substituting a labeled fallback value on any
    /// failure instead of surfacing the error.
    pub async fn execute_or_fallback<F, Fut, T, E>(
        &self,
        operation: &str,
        resource_id: &str,
        f: F,
        fallback: T,
    ) -> FallbackOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.execute(operation, resource_id, f).await {
            Ok(value) => FallbackOutcome::Value(value),
            Err(error) => {
                warn!(
                    operation,
                    resource = resource_id,
                    error = %error,
                    "operation failed, substituting fallback value"
                );
                FallbackOutcome::Fallback { value: fallback, error }
            }
        }
    }

    async fn run<F, Fut, T, E>(
        &self,
        operation: &str,
        resource_id: &str,
        config: &RetryConfig,
        mut f: F,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { operation: operation.to_string() });
            }

            if self.breaker.is_open(resource_id, operation) {
                debug!(operation, resource = resource_id, "circuit open, failing fast");
                return Err(RetryError::CircuitOpen {
                    resource_id: resource_id.to_string(),
                    operation: operation.to_string(),
                });
            }

            let outcome = match config.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, f()).await {
                    Ok(Ok(value)) => AttemptOutcome::Success(value),
                    Ok(Err(error)) => AttemptOutcome::Failed(error),
                    Err(_) => AttemptOutcome::TimedOut(limit),
                },
                None => match f().await {
                    Ok(value) => AttemptOutcome::Success(value),
                    Err(error) => AttemptOutcome::Failed(error),
                },
            };

            match outcome {
                AttemptOutcome::Success(value) => {
                    self.breaker.record_success(resource_id, operation);
                    let resolved = self.history.mark_resolved(resource_id, operation);
                    if attempt > 0 {
                        debug!(
                            operation,
                            resource = resource_id,
                            attempts = attempt + 1,
                            resolved,
                            "operation recovered after retries"
                        );
                    }
                    return Ok(value);
                }
                AttemptOutcome::Failed(error) => {
                    let severity = classify_error(&error);
                    self.history.record(ErrorRecord::new(
                        resource_id,
                        operation,
                        short_type_name::<E>(),
                        error.to_string(),
                        severity,
                        attempt,
                    ));
                    self.breaker.record_failure(resource_id, operation);

                    if !severity.is_retryable() {
                        warn!(
                            operation,
                            resource = resource_id,
                            severity = %severity,
                            error = %error,
                            "non-retryable failure, surfacing immediately"
                        );
                        return Err(RetryError::NonRetryable {
                            operation: operation.to_string(),
                            severity,
                            source: error,
                        });
                    }

                    if attempt >= config.max_retries {
                        warn!(
                            operation,
                            resource = resource_id,
                            attempts = attempt + 1,
                            error = %error,
                            "retry attempts exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt + 1,
                            source: error,
                        });
                    }

                    let delay = config.delay(attempt);
                    warn!(
                        operation,
                        resource = resource_id,
                        attempt = attempt + 1,
                        delay = ?delay,
                        error = %error,
                        "attempt failed, backing off"
                    );
                    if !self.sleep(delay, cancel).await {
                        return Err(RetryError::Cancelled { operation: operation.to_string() });
                    }
                }
                AttemptOutcome::TimedOut(limit) => {
                    self.history.record(ErrorRecord::new(
                        resource_id,
                        operation,
                        "AttemptTimeout",
                        format!("attempt timed out after {limit:?}"),
                        Severity::Medium,
                        attempt,
                    ));
                    self.breaker.record_failure(resource_id, operation);

                    if attempt >= config.max_retries {
                        warn!(
                            operation,
                            resource = resource_id,
                            attempts = attempt + 1,
                            timeout = ?limit,
                            "retry attempts exhausted after timeout"
                        );
                        return Err(RetryError::AttemptTimeout {
                            operation: operation.to_string(),
                            timeout: limit,
                        });
                    }

                    let delay = config.delay(attempt);
                    warn!(
                        operation,
                        resource = resource_id,
                        attempt = attempt + 1,
                        timeout = ?limit,
                        delay = ?delay,
                        "attempt timed out, backing off"
                    );
                    if !self.sleep(delay, cancel).await {
                        return Err(RetryError::Cancelled { operation: operation.to_string() });
                    }
                }
            }

            attempt += 1;
        }
    }

    /// Sleep for the backoff delay. Returns `false` if cancelled mid-sleep.
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Last path segment of a type name, e.g. `io::Error` becomes `Error`.
fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    full.rsplit("::").next().unwrap_or(full)
}
