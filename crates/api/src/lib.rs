//! HTTP status surface for the Bulwark toolkit.
//!
//! Exposes three endpoints over the shared health registry, error history,
//! and circuit-breaker state:
//! - `GET /health` — liveness plus the aggregated health status
//! - `GET /ready` — readiness gated on critical dependencies (503 when one
//!   is down)
//! - `GET /metrics` — request counters, uptime, and per-resource rolling
//!   metrics
//!
//! Configuration is read from the process environment at startup; see
//! [`config`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod server;

pub use config::{ApiConfig, ConfigError, RuntimeConfig};
pub use server::{router, serve, serve_with_listener, AppState};
