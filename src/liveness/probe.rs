//! Loopback scrape of the exporter's own metrics endpoint.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::{Supervisor, SupervisorSignal};

/// Default bound on a single self-check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur during a self-check.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error("liveness check failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("liveness check returned status {0}")]
    Status(StatusCode),
}

/// Self-check run after every poll cycle.
pub trait HealthProbe {
    /// Checks the exporter and sends a watchdog heartbeat on success.
    ///
    /// Returns whether the check passed.
    fn probe<S: Supervisor + Sync>(&self, supervisor: &S) -> impl Future<Output = bool> + Send;
}

/// Returns the URL that reaches a server bound to `addr`.
///
/// Wildcard binds are reached over the loopback of the same family.
pub fn probe_url(addr: SocketAddr, metrics_path: &str) -> String {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!("http://{}{}", SocketAddr::new(ip, addr.port()), metrics_path)
}

/// Scrapes the exporter's own metrics endpoint.
pub struct LivenessProber {
    client: Client,
    url: String,
}

impl LivenessProber {
    /// Creates a prober with the default timeout.
    pub fn new(url: impl Into<String>) -> Result<Self, ProbeError> {
        Self::with_timeout(url, PROBE_TIMEOUT)
    }

    /// Creates a prober with a custom timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(ProbeError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Performs one scrape; the body is read to the end and discarded.
    pub async fn check(&self) -> Result<(), ProbeError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }

        response.bytes().await?;
        Ok(())
    }
}

impl HealthProbe for LivenessProber {
    /// Runs [`check`](LivenessProber::check), watchdog on success.
    async fn probe<S: Supervisor + Sync>(&self, supervisor: &S) -> bool {
        match self.check().await {
            Ok(()) => {
                tracing::debug!(url = %self.url, "Liveness check passed");
                supervisor.notify(SupervisorSignal::Watchdog);
                true
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Liveness check failed");
                false
            }
        }
    }
}
