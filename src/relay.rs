//! Recovery actuator: power-cycles a receiver through the HTTP relay controller.
//!
//! Relay commands are fire-and-forget. Each command returns a result so callers
//! can log it, but nothing escalates a failed command: the following relay
//! command and the next sweep's probe act as the retry.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::registry::channel_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::On => "on",
            RelayState::Off => "off",
        }
    }
}

/// Anything that can flip a single relay channel.
#[async_trait]
pub trait RelayController: Send + Sync {
    async fn switch(&self, channel: u32, state: RelayState) -> Result<()>;
}

/// Relay controller reached over its `relay.cgi` HTTP interface.
pub struct HttpRelayController {
    client: reqwest::Client,
    address: String,
    username: String,
    password: String,
}

impl HttpRelayController {
    /// Client for the relay board in `config`; every request is bounded by `timeout`.
    pub fn new(config: &RelayConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rxwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            address: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn command_url(&self, channel: u32, state: RelayState) -> String {
        relay_command_url(&self.address, channel, state)
    }
}

/// `http://<relay>/relay.cgi?relay<on|off><channel>=<on|off>`
pub fn relay_command_url(address: &str, channel: u32, state: RelayState) -> String {
    format!(
        "http://{}/relay.cgi?relay{}{}={}",
        address,
        state.as_str(),
        channel,
        state.as_str()
    )
}

#[async_trait]
impl RelayController for HttpRelayController {
    async fn switch(&self, channel: u32, state: RelayState) -> Result<()> {
        let url = self.command_url(channel, state);
        let mut request = self.client.get(&url);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        // Body is irrelevant; only whether the controller was reached.
        request.send().await?;
        debug!(channel, state = state.as_str(), "relay command sent");
        Ok(())
    }
}

/// What happened during one power cycle. Kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub device_id: u32,
    pub channel: u32,
    pub on_error: Option<String>,
    pub off_error: Option<String>,
}

impl RecoveryOutcome {
    /// Both relay commands went through.
    pub fn is_clean(&self) -> bool {
        self.on_error.is_none() && self.off_error.is_none()
    }
}

pub struct RecoveryActuator {
    relay: Arc<dyn RelayController>,
    settle: Duration,
}

impl RecoveryActuator {
    /// Create an actuator that waits `settle` between on and off.
    pub fn new(relay: Arc<dyn RelayController>, settle: Duration) -> Self {
        Self { relay, settle }
    }

    /// Relay on, wait the settle duration, relay off.
    ///
    /// Only an id without a relay channel is an error; transport failures end
    /// up in the returned outcome.
    pub async fn power_cycle(&self, device_id: u32) -> Result<RecoveryOutcome> {
        let channel = channel_for(device_id)?;
        info!(device = device_id, channel, "power-cycling device");

        let on_error = self
            .relay
            .switch(channel, RelayState::On)
            .await
            .err()
            .map(|e| e.to_string());

        tokio::time::sleep(self.settle).await;

        let off_error = self
            .relay
            .switch(channel, RelayState::Off)
            .await
            .err()
            .map(|e| e.to_string());

        Ok(RecoveryOutcome {
            device_id,
            channel,
            on_error,
            off_error,
        })
    }

    /// One-shot manual toggle.
    pub async fn set(&self, device_id: u32, state: RelayState) -> Result<()> {
        let channel = channel_for(device_id)?;
        info!(device = device_id, channel, state = state.as_str(), "manual relay toggle");
        self.relay.switch(channel, state).await
    }
}
