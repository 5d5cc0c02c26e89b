pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;
pub mod probe;
pub mod registry;
pub mod relay;
pub mod service;

pub use config::{MonitorConfig, RelayConfig};
pub use error::{Result, WatchdogError};
pub use probe::{NetworkProber, ProbeResult, Prober};
pub use registry::{Device, DeviceRegistry};
pub use relay::{HttpRelayController, RecoveryActuator, RelayController, RelayState};
