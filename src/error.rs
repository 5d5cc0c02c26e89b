use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("config file not found: {path} (pass --config or set RXWATCH_CONFIG)")]
    ConfigNotFound { path: PathBuf },

    #[error("failed to parse config {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("device {0} is not a relay-controlled id (ids start at 72)")]
    UnknownDevice(u32),

    #[error("pidfile {path}: {details}")]
    Pidfile { path: PathBuf, details: String },

    #[error("failed to launch monitor: {0}")]
    Spawn(String),

    #[error("failed to signal PID {pid}: {details}")]
    Signal { pid: u32, details: String },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("service install: {0}")]
    Service(String),

    #[error("logging setup: {0}")]
    Logging(String),
}

impl WatchdogError {
    pub fn pidfile(path: impl Into<PathBuf>, details: impl ToString) -> Self {
        Self::Pidfile {
            path: path.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchdogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_mentions_override() {
        let err = WatchdogError::ConfigNotFound {
            path: PathBuf::from("/nope/config.toml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/config.toml"));
        assert!(msg.contains("RXWATCH_CONFIG"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: WatchdogError = io.into();
        assert!(matches!(err, WatchdogError::Io(_)));
    }
}
