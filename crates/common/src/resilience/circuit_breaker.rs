//! Circuit breaker keyed by `(resource, operation)`.
//!
//! Each key accumulates failures in a trailing window. When the in-window
//! count reaches the configured threshold the circuit opens and calls for
//! that key are rejected until the cooldown elapses. The open-to-half-open
//! transition happens on the next [`CircuitBreaker::is_open`] check, never
//! asynchronously, and half-open admits exactly one probe call: the probe's
//! success removes the key (definitive close), a failure reopens the
//! circuit for another cooldown.
//!
//! Entries are created lazily on the first recorded failure and removed on
//! success, so a healthy system tracks nothing.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing.
///
/// Production code uses [`SystemClock`]; tests use [`MockClock`] to step
/// through window and cooldown expiry without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get the current instant (monotonic time).
    fn now(&self) -> Instant;
}

/// Real system clock for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Mock clock for deterministic testing.
///
/// Clones share the same underlying elapsed time, so advancing one handle
/// advances every circuit breaker holding a clone.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock starting at the current instant.
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the clock by a duration without sleeping.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Get the total advanced time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of in-window failures that opens the circuit.
    pub failure_threshold: u32,
    /// Trailing window over which failures are counted.
    pub failure_window: Duration,
    /// How long an open circuit rejects calls before half-opening.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(5 * 60),
            cooldown: Duration::from_secs(10 * 60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.failure_window.is_zero() {
            return Err(ConfigError::Invalid {
                message: "failure_window must be non-zero".to_string(),
            });
        }

        if self.cooldown.is_zero() {
            return Err(ConfigError::Invalid { message: "cooldown must be non-zero".to_string() });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn failure_window(mut self, window: Duration) -> Self {
        self.config.failure_window = window;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// State Machine
//==============================================================================

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing calls.
    Closed,
    /// Circuit is open, rejecting calls until the cooldown elapses.
    Open,
    /// Circuit is half-open, allowing a single probe call to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    resource_id: String,
    operation: String,
}

impl OperationKey {
    fn new(resource_id: &str, operation: &str) -> Self {
        Self { resource_id: resource_id.to_string(), operation: operation.to_string() }
    }
}

#[derive(Debug)]
struct CircuitEntry {
    state: CircuitState,
    failures: VecDeque<Instant>,
    reset_at: Option<Instant>,
    probe_taken: bool,
}

impl CircuitEntry {
    fn new() -> Self {
        Self { state: CircuitState::Closed, failures: VecDeque::new(), reset_at: None, probe_taken: false }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Point-in-time view of one tracked circuit.
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub resource_id: String,
    pub operation: String,
    pub state: CircuitState,
    /// Failures currently inside the trailing window.
    pub recent_failures: u32,
}

/// Circuit breaker registry keyed by `(resource, operation)`.
///
/// The registry is guarded by a single mutex; wrap the breaker in an `Arc`
/// to share it between executors and health checks. Updates for one key are
/// applied in the order the calls complete; no ordering holds across keys.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    entries: Mutex<HashMap<OperationKey, CircuitEntry>>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("tracked", &self.lock().len())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker with the default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            entries: Mutex::new(HashMap::new()),
            clock: SystemClock,
        }
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing).
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, entries: Mutex::new(HashMap::new()), clock })
    }

    /// Check whether calls for the key should be rejected.
    ///
    /// Unknown keys are closed. For an open entry whose cooldown has
    /// elapsed, this check performs the open-to-half-open transition and
    /// admits the caller as the single probe; until the probe's outcome is
    /// recorded, further checks for the key return `true`.
    pub fn is_open(&self, resource_id: &str, operation: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(&OperationKey::new(resource_id, operation)) else {
            return false;
        };

        match entry.state {
            CircuitState::Closed => false,
            CircuitState::Open => match entry.reset_at {
                Some(reset_at) if now >= reset_at => {
                    entry.state = CircuitState::HalfOpen;
                    entry.probe_taken = true;
                    info!(
                        resource = resource_id,
                        operation, "circuit half-open, admitting probe call"
                    );
                    false
                }
                _ => true,
            },
            CircuitState::HalfOpen => {
                if entry.probe_taken {
                    true
                } else {
                    entry.probe_taken = true;
                    false
                }
            }
        }
    }

    /// Record a failed call for the key.
    ///
    /// Creates the entry on first failure. Opens the circuit when the
    /// in-window failure count reaches the threshold, and reopens it
    /// immediately when the half-open probe fails.
    pub fn record_failure(&self, resource_id: &str, operation: &str) {
        let now = self.clock.now();
        let mut entries = self.lock();
        let entry =
            entries.entry(OperationKey::new(resource_id, operation)).or_insert_with(CircuitEntry::new);

        entry.failures.push_back(now);

        match entry.state {
            CircuitState::Closed => {
                entry.prune(now, self.config.failure_window);
                if entry.failures.len() as u32 >= self.config.failure_threshold {
                    entry.state = CircuitState::Open;
                    entry.reset_at = Some(now + self.config.cooldown);
                    warn!(
                        resource = resource_id,
                        operation,
                        failures = entry.failures.len(),
                        cooldown = ?self.config.cooldown,
                        "circuit opened after repeated failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.reset_at = Some(now + self.config.cooldown);
                entry.probe_taken = false;
                warn!(resource = resource_id, operation, "circuit reopened after failed probe");
            }
            CircuitState::Open => {
                // Already rejecting calls; nothing to transition.
            }
        }
    }

    /// Record a successful call for the key, closing its circuit
    /// definitively by removing the entry.
    pub fn record_success(&self, resource_id: &str, operation: &str) {
        let mut entries = self.lock();
        if let Some(entry) = entries.remove(&OperationKey::new(resource_id, operation)) {
            if entry.state != CircuitState::Closed {
                info!(resource = resource_id, operation, "circuit closed after success");
            } else {
                debug!(resource = resource_id, operation, "failure history cleared after success");
            }
        }
    }

    /// Current state for the key. Unknown keys are closed.
    ///
    /// This is a pure observer; the open-to-half-open transition only
    /// happens inside [`Self::is_open`].
    pub fn state(&self, resource_id: &str, operation: &str) -> CircuitState {
        self.lock()
            .get(&OperationKey::new(resource_id, operation))
            .map(|entry| entry.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of every tracked circuit.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let now = self.clock.now();
        let mut entries = self.lock();
        entries
            .iter_mut()
            .map(|(key, entry)| {
                entry.prune(now, self.config.failure_window);
                CircuitSnapshot {
                    resource_id: key.resource_id.clone(),
                    operation: key.operation.clone(),
                    state: entry.state,
                    recent_failures: entry.failures.len() as u32,
                }
            })
            .collect()
    }

    /// Number of circuits currently open.
    pub fn open_count(&self) -> usize {
        self.lock().values().filter(|entry| entry.state == CircuitState::Open).count()
    }

    /// Drop all tracked state, closing every circuit.
    pub fn reset(&self) {
        self.lock().clear();
        info!("circuit breaker reset, all circuits closed");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKey, CircuitEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("circuit breaker lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
