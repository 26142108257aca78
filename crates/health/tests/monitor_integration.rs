//! Integration tests for the health monitor lifecycle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulwark_health::{
    BoxedError, HealthCheck, HealthMonitor, HealthStatus, HttpProbe, MonitorConfig, ProbeReport,
    Resource,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Probe that fails on its first call and succeeds afterwards.
struct RecoveringProbe {
    calls: AtomicU32,
}

#[async_trait]
impl HealthCheck for RecoveringProbe {
    async fn probe(&self) -> Result<ProbeReport, BoxedError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("upstream exploded".into())
        } else {
            Ok(ProbeReport::healthy())
        }
    }
}

/// The monitor survives a throwing check: the failure is recorded as
/// unhealthy with the message in `details["error"]`, and a subsequent
/// successful check flips the status back to healthy.
#[tokio::test(flavor = "multi_thread")]
async fn monitor_survives_failing_checks() {
    let config = MonitorConfig::new()
        .with_interval(Duration::from_millis(50))
        .with_check_timeout(Duration::from_millis(200));
    let mut monitor = HealthMonitor::new(
        config,
        vec![Resource::new("flaky", Arc::new(RecoveringProbe { calls: AtomicU32::new(0) }))
            .critical(true)],
    );
    let registry = monitor.registry();

    monitor.start().expect("monitor should start");

    // The first sweep runs immediately and records the failure.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let status = registry.status("flaky").expect("first sweep should have recorded");
    assert_eq!(status.latest.status, HealthStatus::Unhealthy);
    assert_eq!(
        status.latest.details.get("error").map(String::as_str),
        Some("upstream exploded")
    );

    // The loop keeps running; the next sweep turns healthy.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = registry.status("flaky").expect("later sweeps should have recorded");
    assert_eq!(status.latest.status, HealthStatus::Healthy);
    assert!(status.checks >= 2);

    monitor.stop().await.expect("monitor should stop");
}

/// Start/stop lifecycle: double start is rejected, stop is prompt, and no
/// sweeps run after shutdown.
#[tokio::test(flavor = "multi_thread")]
async fn monitor_lifecycle() {
    struct CountingProbe(Arc<AtomicU32>);

    #[async_trait]
    impl HealthCheck for CountingProbe {
        async fn probe(&self) -> Result<ProbeReport, BoxedError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeReport::healthy())
        }
    }

    let calls = Arc::new(AtomicU32::new(0));
    let config = MonitorConfig::new().with_interval(Duration::from_millis(20));
    let mut monitor = HealthMonitor::new(
        config,
        vec![Resource::new("svc", Arc::new(CountingProbe(Arc::clone(&calls))))],
    );

    assert!(!monitor.is_running());
    monitor.start().expect("monitor should start");
    assert!(monitor.is_running());
    assert!(monitor.start().is_err(), "second start must be rejected");

    tokio::time::sleep(Duration::from_millis(70)).await;
    monitor.stop().await.expect("monitor should stop");
    assert!(!monitor.is_running());

    let after_stop = calls.load(Ordering::SeqCst);
    assert!(after_stop >= 2, "expected several sweeps before stop");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop, "no sweeps after stop");
}

/// End-to-end with a real HTTP endpoint: the monitor reports healthy while
/// the endpoint returns 200 and unknown resources report `None`.
#[tokio::test(flavor = "multi_thread")]
async fn monitor_with_http_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = MonitorConfig::new().with_interval(Duration::from_secs(60));
    let monitor = HealthMonitor::new(
        config,
        vec![Resource::new("api", Arc::new(HttpProbe::new(format!("{}/health", server.uri()))))],
    );
    let registry = monitor.registry();

    monitor.check_now().await;

    let status = registry.status("api").expect("api should be tracked");
    assert_eq!(status.latest.status, HealthStatus::Healthy);
    assert_eq!(status.uptime_percent, 100.0);
    assert!(registry.status("missing").is_none());
    assert_eq!(registry.overall(), HealthStatus::Healthy);
}
