//! Cross-process execution slots and the fail-fast signal, backed by a
//! coordinator directory shared by every orchestrator process on the
//! machine.
//!
//! Layout under the coordinator directory:
//! - `coordinator.lock`: advisory `flock(2)` file serializing every
//!   mutation of the directory,
//! - `slots/slot-<id>`: one JSON record per granted slot,
//! - `signal.json`: the current fail-fast signal, if any.
//!
//! Uses raw `libc::flock` instead of RAII lock wrappers to avoid the
//! self-referential struct problem: owning just the `File` (which owns
//! the fd) is enough, and `Drop` calls `flock(fd, LOCK_UN)` to release.

pub mod slot;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

pub use slot::{SlotGuard, SlotRecord};

const LOCK_FILE_NAME: &str = "coordinator.lock";
const SIGNAL_FILE_NAME: &str = "signal.json";
pub const SLOTS_DIR_NAME: &str = "slots";

/// Record written by a failing run so peers stop before their next child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSignal {
    pub plugin_name: String,
    pub hook_name: String,
    /// Failing directory, relative to its project root.
    pub directory: String,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
}

/// Handle on one coordinator directory.
#[derive(Debug, Clone)]
pub struct Coordinator {
    dir: PathBuf,
    capacity: u32,
}

/// Advisory lock over the coordinator directory. Held for the duration
/// of one sweep-and-mutate section; released in `Drop` via `LOCK_UN`.
pub(crate) struct CoordinatorLock {
    file: File,
}

impl Drop for CoordinatorLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `self.file`.
        // `LOCK_UN` releases the advisory lock; if it fails, closing the
        // fd moments later releases it anyway.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl Coordinator {
    /// `capacity` is clamped to at least 1 so acquisition can never
    /// deadlock on a zero-capacity pool.
    pub fn new(dir: PathBuf, capacity: u32) -> Self {
        Self {
            dir,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn slots_dir(&self) -> PathBuf {
        self.dir.join(SLOTS_DIR_NAME)
    }

    fn signal_path(&self) -> PathBuf {
        self.dir.join(SIGNAL_FILE_NAME)
    }

    /// Take the coordinator lock (blocking). Every mutation of the slot
    /// directory happens under this.
    pub(crate) fn lock(&self) -> Result<CoordinatorLock> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create coordinator directory: {}", self.dir.display())
        })?;
        let lock_path = self.dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor from the file just opened.
        // Blocking LOCK_EX; coordinator sections are short (sweep + one
        // file create/remove).
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if ret != 0 {
            anyhow::bail!("failed to lock {}", lock_path.display());
        }
        Ok(CoordinatorLock { file })
    }

    /// Read the current fail-fast signal, if any. Lock-free: the signal
    /// is published atomically by rename, so a reader sees either the
    /// whole record or nothing.
    pub fn check_failure_signal(&self) -> Option<FailureSignal> {
        let content = fs::read_to_string(self.signal_path()).ok()?;
        match serde_json::from_str(&content) {
            Ok(signal) => Some(signal),
            Err(error) => {
                tracing::debug!(error = %error, "Ignoring unreadable failure signal");
                None
            }
        }
    }

    /// Publish a fail-fast signal: write-temp-then-rename so peers never
    /// observe a torn record.
    pub fn signal_failure(&self, signal: &FailureSignal) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create coordinator directory: {}", self.dir.display())
        })?;
        let json = serde_json::to_string(signal).context("Failed to serialize failure signal")?;
        let tmp_path = self.dir.join(format!("{SIGNAL_FILE_NAME}.tmp"));
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, self.signal_path())
            .with_context(|| format!("Failed to publish failure signal in {}", self.dir.display()))?;
        Ok(())
    }

    /// Remove any standing signal. Called at the start of every
    /// orchestrator invocation.
    pub fn clear_failure_signal(&self) -> Result<()> {
        match fs::remove_file(self.signal_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to clear failure signal in {}", self.dir.display())
            }),
        }
    }
}

/// Whether a PID names a live process: `kill(pid, 0)` probes without
/// signaling. `EPERM` still means alive (owned by someone else).
pub(crate) fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: kill with signal 0 performs only the existence check.
    let ret = unsafe { libc::kill(pid, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
