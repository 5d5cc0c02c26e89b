//! Liveness probes for receivers and the upstream gateway.
//!
//! Receivers answer `GET /status` on their status port; the gateway gets a
//! single ICMP echo. Every kind of failure (refused, timed out, non-2xx) is
//! reported as the same `Failed` value.

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;
use crate::registry::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeResult {
    Healthy,
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeResult::Healthy => "ok",
            ProbeResult::Failed => "down",
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe_device(&self, device: &Device) -> ProbeResult;

    async fn probe_gateway(&self, address: &str) -> ProbeResult;
}

/// Prober backed by real network requests.
pub struct NetworkProber {
    client: reqwest::Client,
    status_port: u16,
    timeout: Duration,
}

impl NetworkProber {
    /// Create a prober; `timeout` bounds each device request and gateway ping.
    pub fn new(status_port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rxwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            status_port,
            timeout,
        })
    }

    pub fn status_url(&self, device: &Device) -> String {
        format!("http://{}:{}/status", device.ip, self.status_port)
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe_device(&self, device: &Device) -> ProbeResult {
        let url = self.status_url(device);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(device = device.id, status = %resp.status(), "status probe non-2xx");
                ProbeResult::Failed
            }
            Err(e) => {
                debug!(device = device.id, error = %e, "status probe failed");
                ProbeResult::Failed
            }
        }
    }

    async fn probe_gateway(&self, address: &str) -> ProbeResult {
        let wait_secs = self.timeout.as_secs().max(1).to_string();
        let mut cmd = Command::new("ping");
        cmd.args(["-c", "1", "-W", wait_secs.as_str(), address])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let status = cmd.status();

        // ping's own -W bounds the wait; the outer timeout covers a hung binary.
        match tokio::time::timeout(self.timeout + Duration::from_secs(1), status).await {
            Ok(Ok(status)) if status.success() => ProbeResult::Healthy,
            Ok(Ok(status)) => {
                debug!(%address, code = ?status.code(), "gateway ping failed");
                ProbeResult::Failed
            }
            Ok(Err(e)) => {
                debug!(%address, error = %e, "could not run ping");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!(%address, "gateway ping timed out");
                ProbeResult::Failed
            }
        }
    }
}
