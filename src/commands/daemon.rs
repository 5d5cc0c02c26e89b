use anyhow::Result;
use console::style;
use rxwatch::clienv;
use rxwatch::daemon::{
    self, DaemonStatus, Lifecycle, PidFile, ProcessLauncher, SpawnOutcome, StatusReport,
    StopOutcome, DEFAULT_STOP_TIMEOUT,
};
use rxwatch::{DeviceRegistry, MonitorConfig, NetworkProber, ProbeResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{icons, load_config};

/// LSB exit code for "program is not running".
const EXIT_NOT_RUNNING: i32 = 3;

fn lifecycle(config_path: &Path, verbose: bool) -> Result<Lifecycle<ProcessLauncher>> {
    let launcher = ProcessLauncher::new(config_path.to_path_buf(), verbose)?;
    Ok(Lifecycle::new(PidFile::new(clienv::pid_path()), launcher))
}

pub(crate) async fn cmd_start(config_path: &Path, delay: Option<u64>, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let delay = Duration::from_secs(delay.unwrap_or(config.startup_delay_secs));

    match lifecycle(config_path, verbose)?.spawn(delay)? {
        SpawnOutcome::AlreadyRunning { pid } => {
            println!(
                "{} Watchdog already running (PID {})",
                style(icons::INFO).cyan(),
                pid
            );
        }
        SpawnOutcome::Started {
            pid,
            replaced_stale,
        } => {
            if let Some(stale) = replaced_stale {
                println!(
                    "{} Removed stale pidfile (PID {} was not running)",
                    style(icons::WARNING).yellow(),
                    stale
                );
            }
            println!(
                "{} Watchdog started (PID {}, first check in {}s)",
                style(icons::SUCCESS).green(),
                pid,
                delay.as_secs()
            );
            println!(
                "  Log: {}",
                style(clienv::log_path().display()).dim()
            );
        }
    }

    Ok(())
}

pub(crate) async fn cmd_stop(config_path: &Path) -> Result<()> {
    // Stopping must still work with a broken config.
    let timeout = MonitorConfig::load(config_path)
        .map(|config| config.shutdown_grace())
        .unwrap_or(DEFAULT_STOP_TIMEOUT);

    let outcome = lifecycle(config_path, false)?
        .with_stop_timeout(timeout)
        .stop()
        .await?;

    match outcome {
        StopOutcome::NotRunning => {
            println!("{} Watchdog is not running", style(icons::INFO).cyan());
        }
        StopOutcome::Stopped { pid } => {
            println!(
                "{} Watchdog stopped (PID {})",
                style(icons::SUCCESS).green(),
                pid
            );
        }
        StopOutcome::StillStopping { pid } => {
            println!(
                "{} Watchdog (PID {}) may still be stopping (check with `rxwatch status`)",
                style(icons::WARNING).yellow(),
                pid
            );
        }
        StopOutcome::StaleRemoved { pid } => {
            let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
            println!(
                "{} Stale pidfile removed (PID {} was not running)",
                style(icons::WARNING).yellow(),
                pid
            );
        }
    }

    Ok(())
}

pub(crate) async fn cmd_status(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = DeviceRegistry::from_config(&config);
    let prober = NetworkProber::new(config.status_port, config.probe_timeout())?;

    let report = lifecycle(config_path, false)?
        .status(&prober, &registry)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !matches!(report.daemon, DaemonStatus::Running { .. }) {
        std::process::exit(EXIT_NOT_RUNNING);
    }
    Ok(())
}

fn print_report(report: &StatusReport) {
    match &report.daemon {
        DaemonStatus::Running { pid } => println!(
            "{} Watchdog: {} (PID {})",
            style(icons::SUCCESS).green(),
            style("running").green(),
            pid
        ),
        DaemonStatus::NotRunning => println!(
            "{} Watchdog: {}",
            style(icons::ERROR).red(),
            style("not running").red()
        ),
        DaemonStatus::StaleRemoved { pid } => println!(
            "{} Watchdog: {} (removed stale pidfile for PID {})",
            style(icons::WARNING).yellow(),
            style("not running").red(),
            pid
        ),
    }
    println!("  PID file: {}", style(report.pidfile.display()).dim());
    println!();

    println!(
        "  {:<8} {:<16} {:<8} {}",
        "gateway",
        report.gateway,
        "-",
        format_result(report.gateway_result)
    );
    for device in &report.devices {
        println!(
            "  {:<8} {:<16} {:<8} {}",
            device.id,
            device.ip,
            device
                .channel
                .map(|ch| format!("ch {}", ch))
                .unwrap_or_else(|| "-".to_string()),
            format_result(device.result)
        );
    }
}

fn format_result(result: ProbeResult) -> String {
    match result {
        ProbeResult::Healthy => style(result.as_str()).green().to_string(),
        ProbeResult::Failed => style(result.as_str()).red().to_string(),
    }
}

pub(crate) async fn cmd_run(
    config_path: &Path,
    startup_delay: Option<u64>,
    detached: bool,
) -> Result<()> {
    let mut config = match load_config(config_path) {
        Ok(config) => (*config).clone(),
        Err(e) => {
            // A detached daemon has no terminal; the log file is all there is.
            if detached {
                tracing::error!("rxwatch daemon failed to run: {:#}", e);
            }
            return Err(e);
        }
    };
    if let Some(secs) = startup_delay {
        config.startup_delay_secs = secs;
    }

    if !detached {
        println!(
            "{} Running watchdog in foreground (Ctrl+C to stop)",
            style(icons::INFO).cyan()
        );
        println!("  PID: {}", style(clienv::pid_path().display()).dim());
        println!();
    }

    let pidfile = PidFile::new(clienv::pid_path());
    daemon::run_foreground(Arc::new(config), &pidfile).await?;
    Ok(())
}
