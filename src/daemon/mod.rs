//! rxwatch daemon - background receiver watchdog
//!
//! One detached process runs the monitor loop. The pidfile records it, and an
//! exclusive lock on `rxwatch.lock` keeps a second instance out until the
//! first has exited. `start`, `stop` and `status` act on those two files.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                rxwatch run                 │
//! ├────────────────────────────────────────────┤
//! │  HealthMonitor                             │
//! │   gateway ping ─▶ device /status probes    │
//! │                      │ failure             │
//! │                      ▼                     │
//! │               RecoveryActuator ─▶ relay    │
//! └────────────────────────────────────────────┘
//!        ▲ SIGTERM            │ pid
//!   rxwatch stop        rxwatch.pid
//! ```

pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod pidfile;

pub use lifecycle::{
    run_foreground, run_instance, DaemonStatus, DeviceHealth, Launcher, Lifecycle,
    ProcessLauncher, SpawnOutcome, StatusReport, StopOutcome, DEFAULT_STOP_TIMEOUT,
};
pub use monitor::{HealthMonitor, MonitorState, SweepReport, UPLINK_RETRY};
pub use pidfile::{DaemonState, Instance, PidFile, PidStatus};
