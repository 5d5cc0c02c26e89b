//! Pidfile-backed daemon identity.
//!
//! The pidfile is the only record of whether the monitor is running. A file
//! whose PID is no longer alive is stale: every query deletes it and reports
//! the daemon as not running.
//!
//! A running daemon also holds an exclusive lock on `<pidfile>.lock` for its
//! whole lifetime. The lock outlives the pidfile while the daemon finishes a
//! cooperative shutdown, and no second instance can claim it until the
//! process has exited.

use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, WatchdogError};

/// A live daemon as recorded in the pidfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonState {
    pub pid: u32,
    pub pidfile_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidStatus {
    NotRunning,
    Running(DaemonState),
    /// The file named a dead PID and has been removed.
    Stale(u32),
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Pidfile at `path`. Nothing is touched on disk until it is used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the pidfile.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is present, regardless of what it names.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Instance lock held by the running daemon, next to the pidfile.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Raw PID stored in the file, if any. Unparsable content reads as `None`.
    pub fn read(&self) -> Result<Option<u32>> {
        read_pid(&self.path)
    }

    /// Current daemon state. Deletes the file when its PID is dead or unreadable.
    pub fn query(&self) -> Result<PidStatus> {
        if !self.exists() {
            return Ok(PidStatus::NotRunning);
        }

        match self.read()? {
            Some(pid) if is_process_running(pid) => Ok(PidStatus::Running(DaemonState {
                pid,
                pidfile_path: self.path.clone(),
            })),
            Some(pid) => {
                warn!(pid, path = %self.path.display(), "removing stale pidfile");
                self.remove()?;
                Ok(PidStatus::Stale(pid))
            }
            None => {
                warn!(path = %self.path.display(), "removing unreadable pidfile");
                self.remove()?;
                Ok(PidStatus::NotRunning)
            }
        }
    }

    /// Record `pid` as the daemon. Fails if a different live process holds the file.
    pub fn acquire(&self, pid: u32) -> Result<DaemonState> {
        if let PidStatus::Running(state) = self.query()? {
            if state.pid != pid {
                return Err(WatchdogError::pidfile(
                    &self.path,
                    format!("daemon already running with PID {}", state.pid),
                ));
            }
            return Ok(state);
        }

        self.write(pid)?;
        debug!(pid, path = %self.path.display(), "pidfile written");
        Ok(DaemonState {
            pid,
            pidfile_path: self.path.clone(),
        })
    }

    /// Remove the file only if it still names `pid`.
    pub fn release(&self, pid: u32) -> Result<()> {
        if self.read()? == Some(pid) {
            self.remove()?;
            debug!(pid, path = %self.path.display(), "pidfile released");
        }
        Ok(())
    }

    /// Take the instance lock and record `pid` as the daemon.
    ///
    /// Fails while another process holds the lock, even when the pidfile has
    /// already been removed.
    pub fn claim(&self, pid: u32) -> Result<Instance> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| WatchdogError::pidfile(&lock_path, e))?;
        }

        // Not truncated until the lock is ours: the content names the holder.
        let mut lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| WatchdogError::pidfile(&lock_path, e))?;

        if let Err(e) = lock.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(WatchdogError::pidfile(&lock_path, e));
            }
            let holder = read_pid(&lock_path)?
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            return Err(WatchdogError::pidfile(
                &lock_path,
                format!("daemon already running with PID {} (instance lock held)", holder),
            ));
        }

        lock.set_len(0)
            .and_then(|_| writeln!(lock, "{}", pid))
            .map_err(|e| WatchdogError::pidfile(&lock_path, e))?;

        self.acquire(pid)?;
        debug!(pid, lock = %lock_path.display(), "instance lock taken");

        Ok(Instance {
            pid,
            pidfile: self.clone(),
            _lock: lock,
        })
    }

    /// PID of the process holding the instance lock, if anyone does.
    pub fn lock_holder(&self) -> Result<Option<u32>> {
        let lock_path = self.lock_path();
        let lock = match File::open(&lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WatchdogError::pidfile(&lock_path, e)),
        };

        match lock.try_lock_exclusive() {
            // Free. Our own lock goes away when `lock` is closed.
            Ok(()) => Ok(None),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                match read_pid(&lock_path)? {
                    Some(pid) => Ok(Some(pid)),
                    None => Err(WatchdogError::pidfile(
                        &lock_path,
                        "instance lock held by an unknown process",
                    )),
                }
            }
            Err(e) => Err(WatchdogError::pidfile(&lock_path, e)),
        }
    }

    /// Delete the pidfile. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WatchdogError::pidfile(&self.path, e)),
        }
    }

    fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| WatchdogError::pidfile(&self.path, e))?;
        }

        let tmp = self.path.with_extension("pid.tmp");
        fs::write(&tmp, format!("{}\n", pid)).map_err(|e| WatchdogError::pidfile(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| WatchdogError::pidfile(&self.path, e))?;
        Ok(())
    }
}

/// The running daemon's claim on the pidfile and instance lock.
#[derive(Debug)]
pub struct Instance {
    pid: u32,
    pidfile: PidFile,
    _lock: File,
}

impl Instance {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Give up the pidfile. The lock is released as `self` is dropped.
    pub fn release(self) -> Result<()> {
        self.pidfile.release(self.pid)
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WatchdogError::pidfile(path, e)),
    }
}

/// Whether a process with this PID exists. PID 0 and values that do not fit a
/// `pid_t` are never considered alive.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    false
}

/// Ask a process to shut down with SIGTERM.
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).map_err(|_| WatchdogError::Signal {
        pid,
        details: "PID out of range".to_string(),
    })?;
    if raw <= 0 {
        return Err(WatchdogError::Signal {
            pid,
            details: "refusing to signal a process group".to_string(),
        });
    }

    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc != 0 {
        return Err(WatchdogError::Signal {
            pid,
            details: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> Result<()> {
    Err(WatchdogError::Signal {
        pid,
        details: "signals are only supported on unix".to_string(),
    })
}
