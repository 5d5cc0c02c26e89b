use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WatchdogError};
use crate::registry::{MAX_DEVICE_ID, RELAY_CHANNEL_OFFSET};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_POST_POWER_WAIT_SECS: u64 = 10;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STATUS_PORT: u16 = 8073;

/// Relay controller endpoint and its basic-auth credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Monitor configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// First three octets of the receiver subnet, e.g. "192.168.1"
    pub base_ip_prefix: String,
    /// Monitored device ids, in sweep order
    pub device_ids: Vec<u32>,
    pub relay: RelayConfig,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Settle time between relay on and relay off
    #[serde(default = "default_post_power_wait")]
    pub post_power_wait_secs: u64,
    #[serde(default)]
    pub startup_delay_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_post_power_wait() -> u64 {
    DEFAULT_POST_POWER_WAIT_SECS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_status_port() -> u16 {
    DEFAULT_STATUS_PORT
}

impl MonitorConfig {
    /// Read, parse and validate a TOML config file. A missing file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading monitor config");

        if !path.exists() {
            return Err(WatchdogError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| WatchdogError::ConfigParse {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        config.validate()?;

        tracing::debug!(
            devices = ?config.device_ids,
            relay = %config.relay.address,
            poll_interval_secs = config.poll_interval_secs,
            "Monitor config loaded"
        );
        Ok(config)
    }

    /// Reject configs the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        let octets: Vec<&str> = self.base_ip_prefix.split('.').collect();
        if octets.len() != 3 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
            return Err(WatchdogError::InvalidConfig(format!(
                "base_ip_prefix must be three dotted octets, got '{}'",
                self.base_ip_prefix
            )));
        }

        if self.device_ids.is_empty() {
            return Err(WatchdogError::InvalidConfig(
                "device_ids must list at least one device".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for &id in &self.device_ids {
            if id <= RELAY_CHANNEL_OFFSET || id > MAX_DEVICE_ID {
                return Err(WatchdogError::InvalidConfig(format!(
                    "device id {} out of range {}..={}",
                    id,
                    RELAY_CHANNEL_OFFSET + 1,
                    MAX_DEVICE_ID
                )));
            }
            if !seen.insert(id) {
                return Err(WatchdogError::InvalidConfig(format!(
                    "device id {} listed twice",
                    id
                )));
            }
        }

        if self.relay.address.trim().is_empty() {
            return Err(WatchdogError::InvalidConfig(
                "relay.address must not be empty".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(WatchdogError::InvalidConfig(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.probe_timeout_secs == 0 {
            return Err(WatchdogError::InvalidConfig(
                "probe_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn post_power_wait(&self) -> Duration {
        Duration::from_secs(self.post_power_wait_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Upper bound on how long the daemon may take to exit after SIGTERM: a
    /// device probe followed by a full power cycle, plus some slack.
    pub fn shutdown_grace(&self) -> Duration {
        self.post_power_wait() + self.probe_timeout() * 3 + Duration::from_secs(5)
    }
}
