mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use rxwatch::clienv;
use rxwatch::daemon::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = clienv::config_path(cli.config.clone());

    match &cli.command {
        Commands::Run { detached: true, .. } => {
            logging::init_file(&clienv::log_path(), cli.verbose)?
        }
        Commands::Run { .. } => logging::init_stderr(cli.verbose, true)?,
        _ => logging::init_stderr(cli.verbose, false)?,
    }

    match cli.command {
        Commands::Start { delay } => {
            commands::daemon::cmd_start(&config_path, delay, cli.verbose).await?
        }
        Commands::Stop => commands::daemon::cmd_stop(&config_path).await?,
        Commands::Status { json } => commands::daemon::cmd_status(&config_path, json).await?,
        Commands::Run {
            detached,
            startup_delay,
        } => commands::daemon::cmd_run(&config_path, startup_delay, detached).await?,
        Commands::Relay { device_id, state } => {
            commands::relay::cmd_relay(&config_path, device_id, state).await?
        }
        Commands::Install { user, dry_run } => {
            commands::install::cmd_install(&config_path, user, dry_run)?
        }
        Commands::Completions { shell } => commands::completions::cmd_completions(shell),
    }

    Ok(())
}
