//! systemd unit generation and installation for `rxwatch install`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, WatchdogError};

pub const UNIT_NAME: &str = "rxwatch.service";
pub const UNIT_PATH: &str = "/etc/systemd/system/rxwatch.service";

#[derive(Debug, Clone)]
pub struct ServiceUnit {
    pub exe: PathBuf,
    pub config_path: PathBuf,
    pub user: Option<String>,
}

impl ServiceUnit {
    pub fn for_current_exe(config_path: PathBuf, user: Option<String>) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| WatchdogError::Service(format!("cannot locate executable: {}", e)))?;
        Ok(Self {
            exe,
            config_path,
            user,
        })
    }

    /// Unit file text.
    pub fn render(&self) -> String {
        let user_line = self
            .user
            .as_deref()
            .map(|u| format!("User={}\n", u))
            .unwrap_or_default();

        format!(
            "[Unit]\n\
             Description=rxwatch receiver watchdog\n\
             Wants=network-online.target\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             {user_line}\
             ExecStart={exe} --config {config} run\n\
             Restart=on-failure\n\
             RestartSec=10\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            exe = self.exe.display(),
            config = self.config_path.display(),
        )
    }
}

/// Write the unit, reload systemd and enable the service.
pub fn install(unit: &ServiceUnit, unit_path: &Path) -> Result<()> {
    if !unit.config_path.exists() {
        return Err(WatchdogError::ConfigNotFound {
            path: unit.config_path.clone(),
        });
    }

    fs::write(unit_path, unit.render()).map_err(|e| {
        WatchdogError::Service(format!("failed to write {}: {}", unit_path.display(), e))
    })?;
    tracing::info!(path = %unit_path.display(), "Service unit written");

    run_systemctl(&["daemon-reload"])?;
    run_systemctl(&["enable", "--now", UNIT_NAME])?;
    Ok(())
}

fn run_systemctl(args: &[&str]) -> Result<()> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .map_err(|e| WatchdogError::Service(format!("failed to run systemctl: {}", e)))?;

    if !status.success() {
        return Err(WatchdogError::Service(format!(
            "systemctl {} exited with {}",
            args.join(" "),
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(user: Option<&str>) -> ServiceUnit {
        ServiceUnit {
            exe: PathBuf::from("/usr/local/bin/rxwatch"),
            config_path: PathBuf::from("/etc/rxwatch/config.toml"),
            user: user.map(String::from),
        }
    }

    #[test]
    fn test_render_runs_foreground_with_config() {
        let text = unit(None).render();
        assert!(text.contains("ExecStart=/usr/local/bin/rxwatch --config /etc/rxwatch/config.toml run\n"));
        assert!(text.contains("Restart=on-failure"));
        assert!(text.contains("After=network-online.target"));
        assert!(!text.contains("User="));
    }

    #[test]
    fn test_render_with_user() {
        assert!(unit(Some("rxwatch")).render().contains("User=rxwatch\n"));
    }

    #[test]
    fn test_install_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut u = unit(None);
        u.config_path = dir.path().join("missing.toml");

        let err = install(&u, &dir.path().join(UNIT_NAME)).unwrap_err();
        assert!(matches!(err, WatchdogError::ConfigNotFound { .. }));
        assert!(!dir.path().join(UNIT_NAME).exists());
    }
}
