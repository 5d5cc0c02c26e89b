use async_trait::async_trait;
use rxwatch::daemon::HealthMonitor;
use rxwatch::{
    Device, MonitorConfig, ProbeResult, Prober, RelayConfig, RelayController, RelayState, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Each listed device fails the given number of probes, then answers.
#[derive(Default)]
struct FlakyFleet {
    failures: Mutex<HashMap<u32, u32>>,
    probed: Mutex<Vec<u32>>,
}

#[async_trait]
impl Prober for FlakyFleet {
    async fn probe_device(&self, device: &Device) -> ProbeResult {
        self.probed.lock().unwrap().push(device.id);
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&device.id) {
            Some(n) if *n > 0 => {
                *n -= 1;
                ProbeResult::Failed
            }
            _ => ProbeResult::Healthy,
        }
    }

    async fn probe_gateway(&self, _address: &str) -> ProbeResult {
        ProbeResult::Healthy
    }
}

#[derive(Default)]
struct RelayLog {
    commands: Mutex<Vec<(u32, RelayState)>>,
}

#[async_trait]
impl RelayController for RelayLog {
    async fn switch(&self, channel: u32, state: RelayState) -> Result<()> {
        self.commands.lock().unwrap().push((channel, state));
        Ok(())
    }
}

fn config() -> MonitorConfig {
    MonitorConfig {
        base_ip_prefix: "192.168.1".to_string(),
        device_ids: vec![72, 75],
        relay: RelayConfig {
            address: "192.168.1.100".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        },
        poll_interval_secs: 1,
        post_power_wait_secs: 10,
        startup_delay_secs: 0,
        probe_timeout_secs: 5,
        status_port: 8073,
    }
}

fn fleet_failing_75_once() -> Arc<FlakyFleet> {
    let fleet = FlakyFleet::default();
    fleet.failures.lock().unwrap().insert(75, 1);
    Arc::new(fleet)
}

#[tokio::test(start_paused = true)]
async fn recovery_only_for_failed_device_then_quiet() {
    let prober = fleet_failing_75_once();
    let relay = Arc::new(RelayLog::default());
    let monitor = HealthMonitor::new(Arc::new(config()), prober.clone(), relay.clone());
    let (_tx, rx) = watch::channel(false);

    let first = monitor.sweep(&rx).await;
    assert_eq!(first.recovered, vec![75]);
    assert_eq!(first.healthy, vec![72]);
    assert_eq!(
        *relay.commands.lock().unwrap(),
        vec![(4, RelayState::On), (4, RelayState::Off)]
    );

    let second = monitor.sweep(&rx).await;
    assert!(second.recovered.is_empty());
    assert_eq!(second.healthy, vec![72, 75]);
    assert_eq!(relay.commands.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn running_loop_recovers_once_across_two_cycles() {
    let prober = fleet_failing_75_once();
    let relay = Arc::new(RelayLog::default());
    let monitor = Arc::new(HealthMonitor::new(
        Arc::new(config()),
        prober.clone(),
        relay.clone(),
    ));
    let (tx, rx) = watch::channel(false);

    let task = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run(rx).await })
    };

    // Cycle 1 spends 10s in recovery, then 1s idle; cycle 2 runs at t=11.
    tokio::time::sleep(Duration::from_millis(11_500)).await;
    tx.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(*prober.probed.lock().unwrap(), vec![72, 75, 72, 75]);
    assert_eq!(
        *relay.commands.lock().unwrap(),
        vec![(4, RelayState::On), (4, RelayState::Off)]
    );
}
