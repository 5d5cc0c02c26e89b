use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rxwatch")]
#[command(version)]
#[command(about = "Watchdog that power-cycles unresponsive receivers", long_about = None)]
pub(crate) struct Cli {
    /// Config file. Can also be set via RXWATCH_CONFIG env var.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every successful check
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the watchdog in the background
    Start {
        /// Seconds to wait before the first check (default: startup_delay_secs from config)
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Stop the background watchdog
    Stop,

    /// Show daemon state and check every device once
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the watchdog in the foreground (Ctrl+C to stop)
    Run {
        /// Log to the daemon log file instead of stderr
        #[arg(long, hide = true)]
        detached: bool,

        /// Override startup_delay_secs from config
        #[arg(long)]
        startup_delay: Option<u64>,
    },

    /// Switch a device's relay channel by hand
    Relay {
        /// Device id (e.g. 74 drives channel 3)
        device_id: u32,

        state: SwitchState,
    },

    /// Install rxwatch as a systemd service
    Install {
        /// Run the service as this user
        #[arg(long)]
        user: Option<String>,

        /// Print the unit file without installing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum SwitchState {
    On,
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_detached_run() {
        let cli = Cli::parse_from([
            "rxwatch",
            "--config",
            "/etc/rxwatch.toml",
            "run",
            "--detached",
            "--startup-delay",
            "30",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/rxwatch.toml")));
        match cli.command {
            Commands::Run {
                detached,
                startup_delay,
            } => {
                assert!(detached);
                assert_eq!(startup_delay, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_relay_toggle() {
        let cli = Cli::parse_from(["rxwatch", "relay", "74", "off"]);
        assert!(matches!(
            cli.command,
            Commands::Relay {
                device_id: 74,
                state: SwitchState::Off
            }
        ));
    }
}
