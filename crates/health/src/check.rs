//! Health check primitives and built-in probes.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Boxed error returned by probes.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Health status of a monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Resource is reachable and responding normally.
    Healthy,
    /// Resource is reachable but impaired.
    Degraded,
    /// Resource is failing or unreachable.
    Unhealthy,
    /// No result yet, or the check itself could not run.
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome reported by a probe that completed without erroring.
///
/// Probes report `Healthy` or `Degraded`; failure is expressed by
/// returning an error, which the monitor records as `Unhealthy`.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub details: BTreeMap<String, String>,
}

impl ProbeReport {
    /// A healthy report with no details.
    pub fn healthy() -> Self {
        Self { status: HealthStatus::Healthy, details: BTreeMap::new() }
    }

    /// A degraded report with no details.
    pub fn degraded() -> Self {
        Self { status: HealthStatus::Degraded, details: BTreeMap::new() }
    }

    /// Attach a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// A single type-specific check against a monitored resource.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Probe the underlying resource once.
    ///
    /// Implementations should not enforce their own overall deadline; the
    /// monitor bounds every probe with its per-check timeout.
    async fn probe(&self) -> Result<ProbeReport, BoxedError>;
}

/// One recorded check outcome for a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub resource_id: String,
    pub status: HealthStatus,
    pub response_time: Duration,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
    pub error_message: Option<String>,
}

impl HealthCheckResult {
    /// Whether this result counts toward uptime.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

//==============================================================================
// Built-in Probes
//==============================================================================

/// Probes an HTTP endpoint with a GET request.
///
/// 2xx responses are healthy, other statuses are degraded (the endpoint is
/// reachable but not OK), and transport errors fail the probe.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }

    /// Use a preconfigured client (custom TLS, proxies, timeouts).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl HealthCheck for HttpProbe {
    async fn probe(&self) -> Result<ProbeReport, BoxedError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        let report = if status.is_success() {
            ProbeReport::healthy()
        } else {
            ProbeReport::degraded()
        };

        Ok(report.with_detail("status_code", status.as_u16().to_string()))
    }
}

/// Probes TCP connectivity to a `host:port` address.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl HealthCheck for TcpProbe {
    async fn probe(&self) -> Result<ProbeReport, BoxedError> {
        let stream = tokio::net::TcpStream::connect(&self.addr).await?;
        let peer = stream.peer_addr()?;
        Ok(ProbeReport::healthy().with_detail("peer", peer.to_string()))
    }
}

/// Probes liveness by running a command and checking its exit status.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl HealthCheck for CommandProbe {
    async fn probe(&self) -> Result<ProbeReport, BoxedError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(ProbeReport::healthy().with_detail("exit_code", "0"))
        } else {
            Err(format!("command exited with {}", output.status).into())
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the built-in probes.

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Tests that a 200 response yields a healthy report with the status
    /// code recorded.
    #[tokio::test]
    async fn http_probe_healthy_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.uri()));
        let report = probe.probe().await.expect("probe should succeed");

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.details.get("status_code").map(String::as_str), Some("200"));
    }

    /// Tests that a non-2xx response is degraded, not an error.
    #[tokio::test]
    async fn http_probe_degraded_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.uri()));
        let report = probe.probe().await.expect("reachable endpoint should not error");

        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.details.get("status_code").map(String::as_str), Some("503"));
    }

    /// Tests that an unreachable endpoint fails the probe.
    #[tokio::test]
    async fn http_probe_fails_when_unreachable() {
        let probe = HttpProbe::new("http://127.0.0.1:1/health");
        assert!(probe.probe().await.is_err());
    }

    /// Tests TCP connectivity against a live listener and a closed port.
    #[tokio::test]
    async fn tcp_probe_connects_to_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpProbe::new(addr.to_string());
        let report = probe.probe().await.expect("connect should succeed");
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.details.contains_key("peer"));

        drop(listener);
        let probe = TcpProbe::new("127.0.0.1:1");
        assert!(probe.probe().await.is_err());
    }

    /// Tests the command probe against succeeding and failing commands.
    #[tokio::test]
    async fn command_probe_checks_exit_status() {
        let probe = CommandProbe::new("sh").arg("-c").arg("exit 0");
        let report = probe.probe().await.expect("exit 0 should be healthy");
        assert_eq!(report.status, HealthStatus::Healthy);

        let probe = CommandProbe::new("sh").arg("-c").arg("exit 3");
        let error = probe.probe().await.expect_err("exit 3 should fail");
        assert!(error.to_string().contains("exit"));
    }

    /// Validates status display strings and serde casing used by the API.
    #[test]
    fn health_status_display_and_serde() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Unknown.to_string(), "unknown");
        assert_eq!(
            serde_json::to_value(HealthStatus::Degraded).unwrap(),
            serde_json::json!("degraded")
        );
    }
}
