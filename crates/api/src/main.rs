//! Bulwark status service.
//!
//! Wires the health monitor and the HTTP status endpoints together from
//! environment configuration. Ctrl-C stops the monitor loop and drains the
//! server gracefully.

use std::sync::Arc;

use bulwark_api::config::{probes_from_env, ApiConfig, RuntimeConfig};
use bulwark_api::server::{serve, AppState};
use bulwark_common::resilience::CircuitBreaker;
use bulwark_common::ErrorLog;
use bulwark_health::HealthMonitor;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let api_config = ApiConfig::from_env()?;
    let runtime = RuntimeConfig::from_env()?;
    let resources = probes_from_env()?;

    info!(
        retry = ?runtime.retry,
        breaker = ?runtime.breaker,
        monitor = ?runtime.monitor,
        probes = resources.len(),
        "runtime configuration loaded"
    );

    // Shared state: embedding applications hand these same handles to their
    // retry executors so the status surface reflects real traffic.
    let breaker = Arc::new(CircuitBreaker::new(runtime.breaker.clone())?);
    let history = Arc::new(ErrorLog::new());

    let mut monitor = HealthMonitor::new(runtime.monitor.clone(), resources);
    let state = Arc::new(AppState::new(
        monitor.registry(),
        Arc::clone(&history),
        Arc::clone(&breaker),
        api_config.environment.clone(),
    ));

    monitor.start()?;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(api_config.bind_addr, state, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shutdown.cancel();
    monitor.stop().await?;
    server.await??;

    Ok(())
}
