use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, WatchdogError};

/// Default filter; `RUST_LOG` overrides it.
pub fn default_directive(verbose: bool, daemon: bool) -> &'static str {
    match (verbose, daemon) {
        (true, _) => "rxwatch=debug",
        (false, true) => "rxwatch=info",
        (false, false) => "rxwatch=warn",
    }
}

fn env_filter(verbose: bool, daemon: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, daemon)))
}

/// Open the daemon log for appending, creating it (and its directory) if needed.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Subscriber writing the daemon's timestamped plain-text lines to `file`.
pub fn file_subscriber(file: File, verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose, true))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .finish()
}

/// Daemon logging: append to `path`.
pub fn init_file(path: &Path, verbose: bool) -> Result<()> {
    let file = open_log_file(path)?;
    file_subscriber(file, verbose)
        .try_init()
        .map_err(|e| WatchdogError::Logging(e.to_string()))
}

/// Log to stderr. Interactive commands keep their user-facing output on stdout;
/// a foreground `run` uses the daemon's level.
pub fn init_stderr(verbose: bool, daemon: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose, daemon))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| WatchdogError::Logging(e.to_string()))
}
