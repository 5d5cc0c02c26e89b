use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::monitor::HealthMonitor;
use super::pidfile::{self, is_process_running, Instance, PidFile, PidStatus};
use crate::config::MonitorConfig;
use crate::error::{Result, WatchdogError};
use crate::probe::{NetworkProber, ProbeResult, Prober};
use crate::registry::DeviceRegistry;
use crate::relay::{HttpRelayController, RelayController};

/// How long `stop` waits for the daemon to exit when no config is at hand.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Starts the monitor as a detached background process and returns its PID.
pub trait Launcher {
    fn launch(&self, startup_delay: Duration) -> Result<u32>;
}

/// Re-executes the current binary as `rxwatch run --detached`.
pub struct ProcessLauncher {
    exe: PathBuf,
    config_path: PathBuf,
    verbose: bool,
}

impl ProcessLauncher {
    /// Launcher for the running executable with the given config.
    pub fn new(config_path: PathBuf, verbose: bool) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| WatchdogError::Spawn(e.to_string()))?;
        Ok(Self {
            exe,
            config_path,
            verbose,
        })
    }

    fn command(&self, startup_delay: Duration) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.exe);
        cmd.arg("--config").arg(&self.config_path);
        if self.verbose {
            cmd.arg("--verbose");
        }
        let delay_secs = startup_delay.as_secs().to_string();
        cmd.args(["run", "--detached", "--startup-delay", delay_secs.as_str()]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        // Own process group: a Ctrl+C in the launching terminal must not reach it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, startup_delay: Duration) -> Result<u32> {
        let child = self
            .command(startup_delay)
            .spawn()
            .map_err(|e| WatchdogError::Spawn(format!("{}: {}", self.exe.display(), e)))?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    AlreadyRunning { pid: u32 },
    Started { pid: u32, replaced_stale: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { pid: u32 },
    /// SIGTERM was sent but the process outlived the stop timeout. The
    /// pidfile is left for the daemon to remove on exit.
    StillStopping { pid: u32 },
    /// The pidfile named a dead (or unreadable) PID and was removed.
    StaleRemoved { pid: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DaemonStatus {
    Running { pid: u32 },
    NotRunning,
    StaleRemoved { pid: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceHealth {
    pub id: u32,
    pub ip: String,
    /// `None` for an id with no relay channel.
    pub channel: Option<u32>,
    pub result: ProbeResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub daemon: DaemonStatus,
    pub pidfile: PathBuf,
    pub gateway: String,
    pub gateway_result: ProbeResult,
    pub devices: Vec<DeviceHealth>,
}

/// Single-instance control over the background monitor.
pub struct Lifecycle<L: Launcher> {
    pidfile: PidFile,
    launcher: L,
    stop_timeout: Duration,
}

impl<L: Launcher> Lifecycle<L> {
    /// Lifecycle over `pidfile`, launching new daemons through `launcher`.
    pub fn new(pidfile: PidFile, launcher: L) -> Self {
        Self {
            pidfile,
            launcher,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// How long `stop` waits for the daemon to exit after SIGTERM.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Launch the monitor unless a live one is already recorded.
    pub fn spawn(&self, startup_delay: Duration) -> Result<SpawnOutcome> {
        let replaced_stale = match self.pidfile.query()? {
            PidStatus::Running(state) => {
                info!(pid = state.pid, "Daemon already running");
                return Ok(SpawnOutcome::AlreadyRunning { pid: state.pid });
            }
            PidStatus::Stale(pid) => Some(pid),
            PidStatus::NotRunning => None,
        };

        if let Some(pid) = self.pidfile.lock_holder()? {
            info!(pid, "Previous daemon still holds the instance lock");
            return Ok(SpawnOutcome::AlreadyRunning { pid });
        }

        let pid = self.launcher.launch(startup_delay)?;
        self.pidfile.acquire(pid)?;
        info!(
            pid,
            startup_delay_secs = startup_delay.as_secs(),
            "Daemon started"
        );

        Ok(SpawnOutcome::Started {
            pid,
            replaced_stale,
        })
    }

    /// SIGTERM the recorded daemon and wait for it to exit.
    ///
    /// The daemon finishes any power cycle in progress before it exits, so
    /// the pidfile is only removed once the process is gone.
    pub async fn stop(&self) -> Result<StopOutcome> {
        if !self.pidfile.exists() {
            info!("Daemon is not running");
            return Ok(StopOutcome::NotRunning);
        }

        match self.pidfile.read()? {
            Some(pid) if is_process_running(pid) => {
                pidfile::terminate(pid)?;
                info!(pid, "Sent SIGTERM, waiting for daemon to exit");

                if !wait_for_exit(pid, self.stop_timeout).await {
                    warn!(
                        pid,
                        timeout_secs = self.stop_timeout.as_secs(),
                        "Daemon still running after SIGTERM"
                    );
                    return Ok(StopOutcome::StillStopping { pid });
                }

                // Normally already gone: the daemon releases it on the way out.
                self.pidfile.release(pid)?;
                info!(pid, "Daemon stopped");
                Ok(StopOutcome::Stopped { pid })
            }
            pid => {
                warn!(pid = ?pid, "Pidfile was stale, removing");
                self.pidfile.remove()?;
                Ok(StopOutcome::StaleRemoved { pid })
            }
        }
    }

    /// Daemon state plus a one-shot reachability check of every device.
    pub async fn status(
        &self,
        prober: &dyn Prober,
        registry: &DeviceRegistry,
    ) -> Result<StatusReport> {
        let daemon = match self.pidfile.query()? {
            PidStatus::Running(state) => DaemonStatus::Running { pid: state.pid },
            other => match self.pidfile.lock_holder()? {
                Some(pid) => DaemonStatus::Running { pid },
                None => match other {
                    PidStatus::Stale(pid) => DaemonStatus::StaleRemoved { pid },
                    _ => DaemonStatus::NotRunning,
                },
            },
        };

        let gateway = registry.gateway();
        let gateway_result = prober.probe_gateway(&gateway).await;

        let mut devices = Vec::with_capacity(registry.len());
        for device in registry.devices() {
            devices.push(DeviceHealth {
                id: device.id,
                ip: device.ip.clone(),
                channel: device.channel().ok(),
                result: prober.probe_device(device).await,
            });
        }

        Ok(StatusReport {
            daemon,
            pidfile: self.pidfile.path().to_path_buf(),
            gateway,
            gateway_result,
            devices,
        })
    }
}

/// Poll until `pid` is gone. Returns `false` if it is still alive at the deadline.
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while is_process_running(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
    true
}

/// Run the monitor in this process until SIGTERM/SIGINT.
///
/// This is the body of `rxwatch run`, whether started by hand, by the
/// launcher, or by the service manager. Failures are logged before they are
/// returned, since a detached daemon has no stderr.
pub async fn run_foreground(config: Arc<MonitorConfig>, pidfile: &PidFile) -> Result<()> {
    let result = serve(config, pidfile).await;
    if let Err(e) = &result {
        error!(error = %e, "rxwatch daemon failed to run");
    }
    result
}

async fn serve(config: Arc<MonitorConfig>, pidfile: &PidFile) -> Result<()> {
    let instance = pidfile.claim(std::process::id())?;

    let prober = Arc::new(NetworkProber::new(
        config.status_port,
        config.probe_timeout(),
    )?);
    let relay = Arc::new(HttpRelayController::new(
        &config.relay,
        config.probe_timeout(),
    )?);
    let shutdown = shutdown_on_signal()?;

    run_instance(instance, config, prober, relay, shutdown).await
}

/// Drive the monitor as the claimed instance until `shutdown` flips, then
/// give the pidfile back.
pub async fn run_instance(
    instance: Instance,
    config: Arc<MonitorConfig>,
    prober: Arc<dyn Prober>,
    relay: Arc<dyn RelayController>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let pid = instance.pid();
    info!(pid, "rxwatch daemon started");

    HealthMonitor::new(config, prober, relay).run(shutdown).await;

    instance.release()?;
    info!(pid, "rxwatch daemon stopped");
    Ok(())
}

/// Shutdown channel flipped by the first SIGTERM or SIGINT.
fn shutdown_on_signal() -> Result<watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
            let _ = shutdown_tx.send(true);
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C");
            let _ = shutdown_tx.send(true);
        });
    }

    Ok(shutdown_rx)
}
