use serde::Serialize;

use crate::config::MonitorConfig;
use crate::error::{Result, WatchdogError};

/// Device ids map onto relay channels as `id - RELAY_CHANNEL_OFFSET`.
pub const RELAY_CHANNEL_OFFSET: u32 = 71;
/// Highest id that is still a usable host octet.
pub const MAX_DEVICE_ID: u32 = 254;

/// A monitored receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: u32,
    pub ip: String,
}

impl Device {
    /// Device `id` on the `<base_prefix>.0/24` subnet.
    pub fn new(base_prefix: &str, id: u32) -> Self {
        Self {
            id,
            ip: format!("{}.{}", base_prefix, id),
        }
    }

    /// Relay channel wired to this device's power supply.
    pub fn channel(&self) -> Result<u32> {
        channel_for(self.id)
    }
}

/// Relay channel for any relay-controlled id, whether or not it is in the fleet.
pub fn channel_for(device_id: u32) -> Result<u32> {
    if device_id <= RELAY_CHANNEL_OFFSET || device_id > MAX_DEVICE_ID {
        return Err(WatchdogError::UnknownDevice(device_id));
    }
    Ok(device_id - RELAY_CHANNEL_OFFSET)
}

/// The fixed fleet, in sweep order.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    base_prefix: String,
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Build the fleet in config order. Ids are taken as given; run
    /// `MonitorConfig::validate` first to reject ones without a relay channel.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let devices = config
            .device_ids
            .iter()
            .map(|&id| Device::new(&config.base_ip_prefix, id))
            .collect();

        Self {
            base_prefix: config.base_ip_prefix.clone(),
            devices,
        }
    }

    /// Upstream gateway address (`<prefix>.1`).
    pub fn gateway(&self) -> String {
        format!("{}.1", self.base_prefix)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
