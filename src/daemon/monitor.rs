//! The monitor loop.
//!
//! ```text
//! INIT ──▶ UPLINK_CHECK ──▶ DEVICE_SWEEP ──▶ IDLE_WAIT ─┐
//!            ▲   │ gateway down: wait 60s                │
//!            └───┘                                       │
//!            ▲───────────────────────────────────────────┘
//! ```
//!
//! Checks are strictly sequential. A failed device is power-cycled once and
//! is not re-probed until the next sweep. The shutdown channel is checked
//! after UPLINK_CHECK, after every device, and during every wait.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::probe::Prober;
use crate::registry::DeviceRegistry;
use crate::relay::{RecoveryActuator, RelayController};

/// Retry cadence while the gateway is unreachable.
pub const UPLINK_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Init,
    UplinkCheck,
    DeviceSweep,
    IdleWait,
}

/// Result of one pass over the fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub healthy: Vec<u32>,
    pub recovered: Vec<u32>,
    /// Shutdown was requested before every device was checked.
    pub cancelled: bool,
}

pub struct HealthMonitor {
    config: Arc<MonitorConfig>,
    registry: DeviceRegistry,
    prober: Arc<dyn Prober>,
    actuator: RecoveryActuator,
}

impl HealthMonitor {
    /// Create a monitor over the configured fleet.
    pub fn new(
        config: Arc<MonitorConfig>,
        prober: Arc<dyn Prober>,
        relay: Arc<dyn RelayController>,
    ) -> Self {
        let registry = DeviceRegistry::from_config(&config);
        let actuator = RecoveryActuator::new(relay, config.post_power_wait());
        Self {
            config,
            registry,
            prober,
            actuator,
        }
    }

    /// Run until the shutdown channel flips (or its sender goes away).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut state = MonitorState::Init;

        loop {
            state = match state {
                MonitorState::Init => {
                    let delay = self.config.startup_delay();
                    if delay.is_zero() {
                        info!(devices = self.registry.len(), "Monitor starting immediately");
                    } else {
                        info!(
                            devices = self.registry.len(),
                            "Monitor starting in {}s",
                            delay.as_secs()
                        );
                        if !sleep_or_shutdown(delay, &mut shutdown).await {
                            break;
                        }
                    }
                    MonitorState::UplinkCheck
                }
                MonitorState::UplinkCheck => {
                    if !self.wait_for_uplink(&mut shutdown).await || is_shutdown(&shutdown) {
                        break;
                    }
                    MonitorState::DeviceSweep
                }
                MonitorState::DeviceSweep => {
                    let report = self.sweep(&shutdown).await;
                    if report.cancelled {
                        break;
                    }
                    if !report.recovered.is_empty() {
                        info!(recovered = ?report.recovered, "Sweep finished with recoveries");
                    }
                    MonitorState::IdleWait
                }
                MonitorState::IdleWait => {
                    if !sleep_or_shutdown(self.config.poll_interval(), &mut shutdown).await {
                        break;
                    }
                    MonitorState::UplinkCheck
                }
            };
        }

        info!("Monitor stopped");
    }

    /// Block in UPLINK_CHECK until the gateway answers. Returns `false` on shutdown.
    async fn wait_for_uplink(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let gateway = self.registry.gateway();
        loop {
            if self.prober.probe_gateway(&gateway).await.is_healthy() {
                debug!(%gateway, "Gateway reachable");
                return true;
            }

            error!(
                "Gateway {} unreachable, skipping device checks; retrying in {}s",
                gateway,
                UPLINK_RETRY.as_secs()
            );
            if !sleep_or_shutdown(UPLINK_RETRY, shutdown).await {
                return false;
            }
        }
    }

    /// One DEVICE_SWEEP in registry order.
    pub async fn sweep(&self, shutdown: &watch::Receiver<bool>) -> SweepReport {
        let mut report = SweepReport::default();

        for device in self.registry.devices() {
            if self.prober.probe_device(device).await.is_healthy() {
                debug!("Device {} ({}) OK", device.id, device.ip);
                report.healthy.push(device.id);
            } else {
                warn!(
                    "Device {} ({}) not responding, power-cycling",
                    device.id,
                    device.ip
                );
                // Relay errors are not acted on; the next sweep shows whether it worked.
                match self.actuator.power_cycle(device.id).await {
                    Ok(outcome) => {
                        if !outcome.is_clean() {
                            debug!(?outcome, "Relay command failed during recovery");
                        }
                        report.recovered.push(device.id);
                    }
                    Err(e) => warn!(device = device.id, error = %e, "Recovery skipped"),
                }
            }

            if is_shutdown(shutdown) {
                report.cancelled = true;
                break;
            }
        }

        report
    }
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration` unless shutdown comes first. Returns `true` if the full
/// duration elapsed.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if is_shutdown(shutdown) {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::probe::tests::{FakeProber, Probe};
    use crate::probe::ProbeResult;
    use crate::relay::tests::RecordingRelay;
    use crate::relay::RelayState;

    fn config(ids: Vec<u32>) -> MonitorConfig {
        MonitorConfig {
            base_ip_prefix: "192.168.1".to_string(),
            device_ids: ids,
            relay: RelayConfig {
                address: "192.168.1.100".to_string(),
                username: "admin".to_string(),
                password: "pw".to_string(),
            },
            poll_interval_secs: 60,
            post_power_wait_secs: 10,
            startup_delay_secs: 0,
            probe_timeout_secs: 5,
            status_port: 8073,
        }
    }

    fn monitor(
        config: MonitorConfig,
        prober: Arc<FakeProber>,
        relay: Arc<RecordingRelay>,
    ) -> HealthMonitor {
        HealthMonitor::new(Arc::new(config), prober, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_cycles_channel_once() {
        let prober = Arc::new(FakeProber::failing_device(74, 1));
        let relay = Arc::new(RecordingRelay::default());
        let monitor = monitor(config((72..=78).collect()), prober.clone(), relay.clone());
        let (_tx, rx) = watch::channel(false);

        let report = monitor.sweep(&rx).await;

        assert_eq!(report.recovered, vec![74]);
        assert_eq!(report.healthy, vec![72, 73, 75, 76, 77, 78]);
        assert_eq!(relay.commands(), vec![(3, RelayState::On), (3, RelayState::Off)]);
        let calls = relay.calls.lock().unwrap();
        assert_eq!(calls[1].2 - calls[0].2, Duration::from_secs(10));
        // No retry of 74 within the sweep.
        assert_eq!(prober.device_probes(74), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_device_without_channel_is_not_cycled() {
        // Registry built from a config that never went through validate().
        let prober = Arc::new(FakeProber::failing_device(40, 1));
        let relay = Arc::new(RecordingRelay::default());
        let monitor = monitor(config(vec![40, 72]), prober.clone(), relay.clone());
        let (_tx, rx) = watch::channel(false);

        let report = monitor.sweep(&rx).await;

        assert!(report.recovered.is_empty());
        assert_eq!(report.healthy, vec![72]);
        assert!(relay.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_follows_registry_order() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let monitor = monitor(config(vec![76, 72, 74]), prober.clone(), relay.clone());
        let (_tx, rx) = watch::channel(false);

        monitor.sweep(&rx).await;

        assert_eq!(
            prober.probes(),
            vec![Probe::Device(76), Probe::Device(72), Probe::Device(74)]
        );
        assert!(relay.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_stops_at_device_boundary_on_shutdown() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let monitor = monitor(config(vec![72, 73, 74]), prober.clone(), relay);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = monitor.sweep(&rx).await;

        assert!(report.cancelled);
        assert_eq!(prober.probes(), vec![Probe::Device(72)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_down_blocks_device_checks() {
        let prober = Arc::new(FakeProber::with_gateway(vec![
            ProbeResult::Failed,
            ProbeResult::Failed,
            ProbeResult::Failed,
        ]));
        let relay = Arc::new(RecordingRelay::default());
        let mut cfg = config(vec![72, 73]);
        cfg.poll_interval_secs = 10_000;
        let monitor = Arc::new(monitor(cfg, prober.clone(), relay));
        let (tx, rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(200)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        let log = prober.log.lock().unwrap();
        let gateway_times: Vec<u64> = log
            .iter()
            .filter(|(p, _)| matches!(p, Probe::Gateway(_)))
            .map(|(_, t)| (*t - start).as_secs())
            .collect();
        assert_eq!(gateway_times, vec![0, 60, 120, 180]);

        for (probe, at) in log.iter() {
            if let Probe::Device(_) = probe {
                assert!((*at - start).as_secs() >= 180, "device probed while uplink down");
            }
        }
        assert_eq!(
            log.iter()
                .filter(|(p, _)| matches!(p, Probe::Device(_)))
                .count(),
            2
        );
        assert!(log
            .iter()
            .all(|(p, _)| !matches!(p, Probe::Gateway(g) if g != "192.168.1.1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_delay_precedes_first_probe() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let mut cfg = config(vec![72]);
        cfg.startup_delay_secs = 30;
        let monitor = Arc::new(monitor(cfg, prober.clone(), relay));
        let (tx, rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(40)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        let log = prober.log.lock().unwrap();
        assert!(!log.is_empty());
        assert_eq!((log[0].1 - start).as_secs(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_startup_delay_probes_nothing() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let mut cfg = config(vec![72]);
        cfg.startup_delay_secs = 300;
        let monitor = Arc::new(monitor(cfg, prober.clone(), relay));
        let (tx, rx) = watch::channel(false);

        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(prober.probes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_repeats_after_poll_interval() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let monitor = Arc::new(monitor(config(vec![72]), prober.clone(), relay));
        let (tx, rx) = watch::channel(false);

        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(rx).await })
        };

        // Cycles start at t=0, 60 and 120.
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(prober.device_probes(72), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_loop() {
        let prober = Arc::new(FakeProber::default());
        let relay = Arc::new(RecordingRelay::default());
        let monitor = monitor(config(vec![72]), prober, relay);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        // Would never return if the closed channel were ignored.
        monitor.run(rx).await;
    }
}
