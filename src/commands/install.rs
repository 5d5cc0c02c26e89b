use anyhow::{bail, Result};
use console::style;
use rxwatch::service::{self, ServiceUnit, UNIT_PATH};
use std::path::{Path, PathBuf};

use super::icons;

pub(crate) fn cmd_install(config_path: &Path, user: Option<String>, dry_run: bool) -> Result<()> {
    // The unit outlives this shell, so it needs an absolute config path.
    let config_path = std::path::absolute(config_path)?;
    let unit = ServiceUnit::for_current_exe(config_path, user)?;

    if dry_run {
        print!("{}", unit.render());
        return Ok(());
    }

    verify_platform()?;

    println!(
        "{} Installing {}...",
        style(icons::INFO).cyan(),
        style(UNIT_PATH).bold()
    );
    service::install(&unit, &PathBuf::from(UNIT_PATH))?;
    println!(
        "{} Service installed and started",
        style(icons::SUCCESS).green()
    );
    println!(
        "  Check it with {}",
        style("systemctl status rxwatch").bold()
    );

    Ok(())
}

fn verify_platform() -> Result<()> {
    if cfg!(not(target_os = "linux")) {
        bail!("Service install is only supported on Linux (systemd)");
    }
    Ok(())
}
