//! Data directory lock
//!
//! Two detectors writing the same `anomalies.json` (or opening the same sled
//! tree) would silently overwrite each other's log. The lock is a PID file in
//! the data directory, removed on drop; a lock left behind by a dead process
//! is treated as stale and replaced.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::PersistenceError;

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    pub const LOCK_FILE_NAME: &'static str = ".aquasense.lock";

    /// Acquire the lock for `data_dir`, creating the directory if needed.
    pub fn acquire(data_dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) => {
                    return Err(PersistenceError::Locked {
                        pid,
                        path: lock_path,
                    })
                }
                None => {
                    info!(path = %lock_path.display(), "Removing stale lock file");
                    if let Err(e) = fs::remove_file(&lock_path) {
                        warn!(error = %e, "Failed to remove stale lock file");
                    }
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))?;
        debug!(pid, path = %lock_path.display(), "Acquired data directory lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID of a live process holding the lock, if any. Unreadable or
    /// unparsable lock files count as stale.
    fn holder(lock_path: &Path) -> Option<u32> {
        let pid: u32 = fs::read_to_string(lock_path).ok()?.trim().parse().ok()?;
        (pid != std::process::id() && Self::is_process_running(pid)).then_some(pid)
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("aquasense"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!(error = %e, "Failed to remove lock file");
            } else {
                debug!(path = %self.lock_path.display(), "Released data directory lock");
            }
            self.owned = false;
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
