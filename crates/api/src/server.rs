//! HTTP status endpoints.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bulwark_common::resilience::CircuitBreaker;
use bulwark_common::ErrorLog;
use bulwark_health::{HealthRegistry, HealthStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state behind the status endpoints.
pub struct AppState {
    registry: HealthRegistry,
    history: Arc<ErrorLog>,
    breaker: Arc<CircuitBreaker>,
    environment: String,
    started: Instant,
    requests_total: AtomicU64,
    errors_total: AtomicU64,
}

impl AppState {
    pub fn new(
        registry: HealthRegistry,
        history: Arc<ErrorLog>,
        breaker: Arc<CircuitBreaker>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            history,
            breaker,
            environment: environment.into(),
            started: Instant::now(),
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
        }
    }

    fn count_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn count_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Build the status router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the status endpoints until the shutdown token fires.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state, shutdown).await
}

/// Serve on an already-bound listener (lets tests bind port 0).
pub async fn serve_with_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "status server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: HealthStatus,
    timestamp: DateTime<Utc>,
    environment: String,
    version: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.count_request();
    Json(HealthResponse {
        status: state.registry.overall(),
        timestamp: Utc::now(),
        environment: state.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct DependencyStatus {
    status: HealthStatus,
    message: String,
    critical: bool,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    dependencies: BTreeMap<String, DependencyStatus>,
}

/// Readiness: 200 while every critical dependency's latest check is
/// healthy or degraded, 503 otherwise.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request();

    let mut dependencies = BTreeMap::new();
    let mut is_ready = true;

    for (id, status) in state.registry.all_statuses() {
        let acceptable = matches!(
            status.latest.status,
            HealthStatus::Healthy | HealthStatus::Degraded
        );
        if status.critical && !acceptable {
            is_ready = false;
        }

        let message = status
            .latest
            .error_message
            .clone()
            .unwrap_or_else(|| status.latest.status.to_string());
        dependencies.insert(
            id,
            DependencyStatus { status: status.latest.status, message, critical: status.critical },
        );
    }

    let code = if is_ready {
        StatusCode::OK
    } else {
        state.count_error();
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = ReadyResponse {
        status: if is_ready { "ready" } else { "not_ready" },
        timestamp: Utc::now(),
        dependencies,
    };

    (code, Json(body))
}

#[derive(Debug, Serialize)]
struct ResourceMetrics {
    average_response_time_ms: u64,
    uptime_percent: f64,
    checks: usize,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    requests_total: u64,
    errors_total: u64,
    uptime_seconds: u64,
    recorded_errors: usize,
    unresolved_errors: usize,
    open_circuits: usize,
    resources: BTreeMap<String, ResourceMetrics>,
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    state.count_request();

    let resources = state
        .registry
        .all_statuses()
        .into_iter()
        .map(|(id, status)| {
            (
                id,
                ResourceMetrics {
                    average_response_time_ms: status.average_response_time.as_millis() as u64,
                    uptime_percent: status.uptime_percent,
                    checks: status.checks,
                },
            )
        })
        .collect();

    Json(MetricsResponse {
        requests_total: state.requests_total.load(Ordering::Relaxed),
        errors_total: state.errors_total.load(Ordering::Relaxed),
        uptime_seconds: state.started.elapsed().as_secs(),
        recorded_errors: state.history.len(),
        unresolved_errors: state.history.unresolved_count(),
        open_circuits: state.breaker.open_count(),
        resources,
    })
}
