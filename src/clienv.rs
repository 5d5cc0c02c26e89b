use std::path::PathBuf;

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const FALLBACK_DATA_DIR: &str = "~/.local/share";
const RXWATCH_SUBDIR: &str = "rxwatch";

pub const ENV_CONFIG: &str = "RXWATCH_CONFIG";
pub const ENV_PID: &str = "RXWATCH_PID";
pub const ENV_LOG: &str = "RXWATCH_LOG";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Config directory (~/.config/rxwatch)
pub fn config_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
        .join(RXWATCH_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Data directory (~/.local/share/rxwatch)
pub fn data_dir() -> PathBuf {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
        .join(RXWATCH_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Resolved data directory");
    dir
}

/// Config file path (--config > $RXWATCH_CONFIG > ~/.config/rxwatch/config.toml)
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    let path = flag
        .or_else(|| env_opt(ENV_CONFIG).map(PathBuf::from))
        .unwrap_or_else(|| config_dir().join("config.toml"));
    tracing::trace!(path = %path.display(), "Config path");
    path
}

/// Daemon PID file path ($RXWATCH_PID or ~/.local/share/rxwatch/rxwatch.pid)
pub fn pid_path() -> PathBuf {
    let path = env_opt(ENV_PID)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("rxwatch.pid"));
    tracing::trace!(path = %path.display(), "Daemon PID path");
    path
}

/// Daemon log file path ($RXWATCH_LOG or ~/.local/share/rxwatch/rxwatch.log)
pub fn log_path() -> PathBuf {
    let path = env_opt(ENV_LOG)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("rxwatch.log"));
    tracing::trace!(path = %path.display(), "Daemon log path");
    path
}
