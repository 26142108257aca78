//! Periodic health monitoring for external dependencies.
//!
//! A [`HealthMonitor`] polls a set of named resources on an interval,
//! running every resource's probe concurrently each tick with a bounded
//! per-check timeout. Results accumulate in a shared [`HealthRegistry`]
//! that exposes the latest status per resource, rolling metrics over the
//! retention window, and an aggregated overall status.
//!
//! A failing or hanging probe never stops the monitor loop: each check is
//! isolated and its error is recorded as an unhealthy result.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod check;
pub mod monitor;

// Re-export commonly used types for convenience
// ------------------------------
pub use check::{
    BoxedError, CommandProbe, HealthCheck, HealthCheckResult, HealthStatus, HttpProbe,
    ProbeReport, TcpProbe,
};
pub use monitor::{
    HealthMonitor, HealthRegistry, MonitorConfig, MonitorError, Resource, ResourceStatus,
};
