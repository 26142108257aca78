//! Integration tests for the HTTP status endpoints.
//!
//! Each test binds the server on an ephemeral port and exercises it with a
//! real HTTP client against a registry populated by hand.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bulwark_api::server::{serve_with_listener, AppState};
use bulwark_common::resilience::CircuitBreaker;
use bulwark_common::{ErrorLog, ErrorRecord, Severity};
use bulwark_health::{HealthCheckResult, HealthRegistry, HealthStatus};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

struct TestServer {
    base_url: String,
    registry: HealthRegistry,
    history: Arc<ErrorLog>,
    breaker: Arc<CircuitBreaker>,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let registry = HealthRegistry::new(Duration::from_secs(3600));
        let history = Arc::new(ErrorLog::new());
        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let state = Arc::new(AppState::new(
            registry.clone(),
            Arc::clone(&history),
            Arc::clone(&breaker),
            "test",
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = CancellationToken::new();

        tokio::spawn(serve_with_listener(listener, state, shutdown.clone()));

        Self { base_url: format!("http://{addr}"), registry, history, breaker, shutdown }
    }

    async fn get(&self, path: &str) -> (reqwest::StatusCode, serde_json::Value) {
        let response = reqwest::get(format!("{}{}", self.base_url, path))
            .await
            .expect("request should reach the server");
        let status = response.status();
        let body = response.json().await.expect("body should be JSON");
        (status, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn check(resource_id: &str, status: HealthStatus, millis: u64) -> HealthCheckResult {
    let mut details = BTreeMap::new();
    if status == HealthStatus::Unhealthy {
        details.insert("error".to_string(), "connection refused".to_string());
    }
    HealthCheckResult {
        resource_id: resource_id.to_string(),
        status,
        response_time: Duration::from_millis(millis),
        timestamp: Utc::now(),
        details,
        error_message: (status == HealthStatus::Unhealthy)
            .then(|| "connection refused".to_string()),
    }
}

/// `/health` always answers 200 with the aggregated status, environment,
/// and version.
#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_reports_overall_status() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "unknown", "no checks recorded yet");
    assert_eq!(body["environment"], "test");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());

    server.registry.record(check("db", HealthStatus::Healthy, 5), true);
    let (_, body) = server.get("/health").await;
    assert_eq!(body["status"], "healthy");

    server.registry.record(check("db", HealthStatus::Unhealthy, 5), true);
    let (status, body) = server.get("/health").await;
    assert_eq!(status, reqwest::StatusCode::OK, "liveness stays 200");
    assert_eq!(body["status"], "unhealthy");
}

/// `/ready` flips between 200 and 503 with a critical dependency's status
/// and lists every dependency with status, message, and criticality.
#[tokio::test(flavor = "multi_thread")]
async fn ready_endpoint_gates_on_critical_dependencies() {
    let server = TestServer::start().await;
    server.registry.record(check("db", HealthStatus::Healthy, 5), true);
    server.registry.record(check("docs", HealthStatus::Unhealthy, 5), false);

    // A non-critical unhealthy dependency does not block readiness.
    let (status, body) = server.get("/ready").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["dependencies"]["db"]["critical"], true);
    assert_eq!(body["dependencies"]["docs"]["status"], "unhealthy");
    assert_eq!(body["dependencies"]["docs"]["message"], "connection refused");

    // A critical unhealthy dependency does.
    server.registry.record(check("db", HealthStatus::Unhealthy, 5), true);
    let (status, body) = server.get("/ready").await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    // Degraded is still acceptable for readiness.
    server.registry.record(check("db", HealthStatus::Degraded, 5), true);
    let (status, _) = server.get("/ready").await;
    assert_eq!(status, reqwest::StatusCode::OK);
}

/// `/metrics` exposes monotonically increasing request counters, error
/// bookkeeping, and per-resource rolling metrics.
#[tokio::test(flavor = "multi_thread")]
async fn metrics_endpoint_reports_counters_and_rollups() {
    let server = TestServer::start().await;
    server.registry.record(check("db", HealthStatus::Healthy, 10), true);
    server.registry.record(check("db", HealthStatus::Healthy, 30), true);

    server.history.record(ErrorRecord::new(
        "db",
        "query",
        "IoError",
        "connection reset",
        Severity::Medium,
        0,
    ));
    server.breaker.record_failure("db", "query");

    let (status, first) = server.get("/metrics").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(first["resources"]["db"]["average_response_time_ms"], 20);
    assert_eq!(first["resources"]["db"]["uptime_percent"], 100.0);
    assert_eq!(first["resources"]["db"]["checks"], 2);
    assert_eq!(first["recorded_errors"], 1);
    assert_eq!(first["unresolved_errors"], 1);
    assert_eq!(first["open_circuits"], 0, "one failure is below the threshold");

    let (_, second) = server.get("/metrics").await;
    let first_total = first["requests_total"].as_u64().expect("counter");
    let second_total = second["requests_total"].as_u64().expect("counter");
    assert!(second_total > first_total, "requests_total must increase");
}

/// A 503 readiness response increments `errors_total`.
#[tokio::test(flavor = "multi_thread")]
async fn not_ready_responses_count_as_errors() {
    let server = TestServer::start().await;
    server.registry.record(check("db", HealthStatus::Unhealthy, 5), true);

    let (status, _) = server.get("/ready").await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let (_, metrics) = server.get("/metrics").await;
    assert_eq!(metrics["errors_total"], 1);
}
