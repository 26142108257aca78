//! Periodic health monitoring with per-resource history.
//!
//! The monitor follows a worker pattern with clean separation:
//! - [`HealthMonitor`]: lifecycle coordinator (owns the task handle)
//! - [`monitor_worker`]: pure async worker function (easier to test)
//! - [`HealthRegistry`]: shared result store readable by other components

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::check::{HealthCheck, HealthCheckResult, HealthStatus};

/// Errors from the monitor lifecycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Health monitor already running")]
    AlreadyRunning,

    #[error("Health monitor shutdown timed out")]
    ShutdownTimeout,

    #[error("Monitor task join failed: {message}")]
    Join { message: String },
}

/// Configuration for the monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often every resource is checked.
    pub interval: Duration,
    /// Default per-check timeout.
    pub check_timeout: Duration,
    /// How long results are retained for rolling metrics.
    pub retention: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// A monitored resource: an identifier plus the probe that checks it.
#[derive(Clone)]
pub struct Resource {
    id: String,
    probe: Arc<dyn HealthCheck>,
    critical: bool,
    timeout: Option<Duration>,
}

impl Resource {
    pub fn new(id: impl Into<String>, probe: Arc<dyn HealthCheck>) -> Self {
        Self { id: id.into(), probe, critical: false, timeout: None }
    }

    /// Mark the resource as critical for readiness aggregation.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Override the monitor's default per-check timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Rolling view of one resource derived from its retained history.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    /// Most recent check result.
    pub latest: HealthCheckResult,
    /// Average response time over the retained history.
    pub average_response_time: Duration,
    /// Percentage of retained checks that were healthy.
    pub uptime_percent: f64,
    /// Number of retained checks.
    pub checks: usize,
    /// Whether the resource is critical for readiness.
    pub critical: bool,
}

#[derive(Debug)]
struct ResourceHistory {
    critical: bool,
    results: VecDeque<HealthCheckResult>,
}

/// Shared registry of health-check results.
///
/// Cheap to clone; all clones share the same store. The monitor writes
/// results into it and the API layer reads statuses out of it.
#[derive(Clone)]
pub struct HealthRegistry {
    retention: Duration,
    inner: Arc<RwLock<HashMap<String, ResourceHistory>>>,
}

impl fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("retention", &self.retention)
            .field("resources", &self.read().len())
            .finish()
    }
}

impl HealthRegistry {
    pub fn new(retention: Duration) -> Self {
        Self { retention, inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Append a result for a resource, pruning history outside the
    /// retention window.
    pub fn record(&self, result: HealthCheckResult, critical: bool) {
        let now = Utc::now();
        let mut inner = self.write();
        let history = inner
            .entry(result.resource_id.clone())
            .or_insert_with(|| ResourceHistory { critical, results: VecDeque::new() });

        history.critical = critical;
        history.results.push_back(result);

        while let Some(front) = history.results.front() {
            let age = now.signed_duration_since(front.timestamp);
            let expired = age.to_std().map(|age| age > self.retention).unwrap_or(false);
            if expired {
                history.results.pop_front();
            } else {
                break;
            }
        }
    }

    /// Latest result plus rolling metrics for one resource.
    pub fn status(&self, resource_id: &str) -> Option<ResourceStatus> {
        let inner = self.read();
        let history = inner.get(resource_id)?;
        let latest = history.results.back()?.clone();

        let checks = history.results.len();
        let total_time: Duration = history.results.iter().map(|r| r.response_time).sum();
        let healthy = history.results.iter().filter(|r| r.is_healthy()).count();

        Some(ResourceStatus {
            latest,
            average_response_time: total_time / checks as u32,
            uptime_percent: healthy as f64 / checks as f64 * 100.0,
            checks,
            critical: history.critical,
        })
    }

    /// Statuses for every tracked resource, keyed by id.
    pub fn all_statuses(&self) -> BTreeMap<String, ResourceStatus> {
        let ids: Vec<String> = self.read().keys().cloned().collect();
        ids.into_iter().filter_map(|id| self.status(&id).map(|status| (id, status))).collect()
    }

    /// Aggregate status across all resources.
    ///
    /// Any unhealthy resource makes the whole system unhealthy; otherwise
    /// any degraded resource degrades it; all-healthy is healthy; an empty
    /// registry (or one with only unknown results) is unknown.
    pub fn overall(&self) -> HealthStatus {
        let inner = self.read();
        let latest: Vec<HealthStatus> =
            inner.values().filter_map(|h| h.results.back().map(|r| r.status)).collect();

        if latest.is_empty() {
            return HealthStatus::Unknown;
        }
        if latest.iter().any(|s| *s == HealthStatus::Unhealthy) {
            return HealthStatus::Unhealthy;
        }
        if latest.iter().any(|s| *s == HealthStatus::Degraded) {
            return HealthStatus::Degraded;
        }
        if latest.iter().all(|s| *s == HealthStatus::Healthy) {
            return HealthStatus::Healthy;
        }
        HealthStatus::Unknown
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ResourceHistory>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("health registry lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ResourceHistory>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("health registry lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Health monitor with explicit lifecycle.
///
/// `start()` spawns a Tokio task that sweeps all resources at the
/// configured interval; `stop()` cancels it and waits for the task to
/// finish, bounded by a shutdown timeout.
pub struct HealthMonitor {
    config: MonitorConfig,
    resources: Arc<Vec<Resource>>,
    registry: HealthRegistry,
    task_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig, resources: Vec<Resource>) -> Self {
        let registry = HealthRegistry::new(config.retention);
        Self {
            config,
            resources: Arc::new(resources),
            registry,
            task_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Handle to the shared result registry.
    pub fn registry(&self) -> HealthRegistry {
        self.registry.clone()
    }

    /// Start background monitoring.
    ///
    /// The worker sweeps all resources once immediately, then on every
    /// interval tick until `stop()` is called.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.task_handle.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let config = self.config.clone();
        let resources = Arc::clone(&self.resources);
        let registry = self.registry.clone();
        let cancel = self.cancellation.clone();

        info!(
            interval = ?config.interval,
            resources = resources.len(),
            "starting health monitor"
        );

        let handle = tokio::spawn(async move {
            monitor_worker(config, resources, registry, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop background monitoring, waiting up to five seconds for the
    /// worker to wind down.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .map_err(|_| MonitorError::ShutdownTimeout)?
                .map_err(|e| MonitorError::Join { message: e.to_string() })?;
        }

        info!("health monitor stopped");
        Ok(())
    }

    /// Whether the monitor task is currently running.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }

    /// Run a single sweep of all resources immediately.
    pub async fn check_now(&self) {
        run_sweep(&self.config, &self.resources, &self.registry).await;
    }
}

/// Pure async worker for the monitor loop.
///
/// Separated from [`HealthMonitor`] so tests can drive it without the
/// task-spawning lifecycle. Sweeps once on entry, then once per interval
/// tick; stops when `cancel` fires.
pub async fn monitor_worker(
    config: MonitorConfig,
    resources: Arc<Vec<Resource>>,
    registry: HealthRegistry,
    cancel: CancellationToken,
) {
    run_sweep(&config, &resources, &registry).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("health monitor worker shutting down");
                break;
            }
            _ = tokio::time::sleep(config.interval) => {
                run_sweep(&config, &resources, &registry).await;
            }
        }
    }
}

/// Check every resource concurrently and record the results.
async fn run_sweep(config: &MonitorConfig, resources: &[Resource], registry: &HealthRegistry) {
    let checks = resources.iter().map(|resource| check_resource(config, resource));
    let results = join_all(checks).await;

    for (resource, result) in resources.iter().zip(results) {
        debug!(
            resource = resource.id(),
            status = %result.status,
            response_time = ?result.response_time,
            "health check recorded"
        );
        registry.record(result, resource.is_critical());
    }
}

/// Run one probe with its timeout, mapping errors and timeouts to an
/// unhealthy result instead of letting them escape into the loop.
async fn check_resource(config: &MonitorConfig, resource: &Resource) -> HealthCheckResult {
    let limit = resource.timeout.unwrap_or(config.check_timeout);
    let started = Instant::now();
    let outcome = tokio::time::timeout(limit, resource.probe.probe()).await;
    let response_time = started.elapsed();

    let mut result = HealthCheckResult {
        resource_id: resource.id().to_string(),
        status: HealthStatus::Unhealthy,
        response_time,
        timestamp: Utc::now(),
        details: BTreeMap::new(),
        error_message: None,
    };

    match outcome {
        Ok(Ok(report)) => {
            result.status = report.status;
            result.details = report.details;
        }
        Ok(Err(error)) => {
            warn!(resource = resource.id(), error = %error, "health check failed");
            result.details.insert("error".to_string(), error.to_string());
            result.error_message = Some(error.to_string());
        }
        Err(_) => {
            let message = format!("check timed out after {limit:?}");
            warn!(resource = resource.id(), timeout = ?limit, "health check timed out");
            result.details.insert("error".to_string(), message.clone());
            result.error_message = Some(message);
        }
    }

    result
}
