// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-instance guard backed by an exclusive-create PID file.
//!
//! Acquisition uses `OpenOptions::create_new`, so two racing processes can
//! never both believe they created the file. A lock left behind by a dead
//! process is reclaimed after a liveness check on the recorded PID.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use dripmail_core::error::DripmailError;

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

/// Checks whether a process with `pid` is currently running.
fn process_alive(pid: u32) -> bool {
    let target = sysinfo::Pid::from_u32(pid);
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[target]), true);
    sys.process(target).is_some()
}

/// Held for the lifetime of the process; releasing (explicitly or on drop)
/// deletes the lock file only if it still records this process's PID.
pub struct InstanceLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl InstanceLock {
    /// Acquires the lock, reclaiming it from a dead owner if necessary.
    ///
    /// Fails with `AlreadyRunning` when another live process holds it.
    pub fn acquire(path: &Path) -> Result<Self, DripmailError> {
        let pid = std::process::id();
        match Self::try_create(path, pid) {
            Ok(lock) => {
                info!(path = %path.display(), pid, "instance lock acquired");
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let mut owner = read_owner(path);
                if owner.is_none() {
                    // The creator may still be mid-write; give it a moment
                    // before concluding the file is garbage.
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    owner = read_owner(path);
                }
                if let Some(owner) = owner {
                    if process_alive(owner) {
                        return Err(DripmailError::AlreadyRunning { pid: owner });
                    }
                    warn!(
                        path = %path.display(),
                        stale_pid = owner,
                        "reclaiming lock from dead process"
                    );
                } else {
                    warn!(path = %path.display(), "reclaiming unreadable lock file");
                }
                fs::remove_file(path).map_err(|e| {
                    DripmailError::Internal(format!(
                        "failed to remove stale lock {}: {e}",
                        path.display()
                    ))
                })?;
                // One retry only; losing the race here means another process
                // started in the same instant and legitimately owns it.
                let lock = Self::try_create(path, pid).map_err(|e| {
                    DripmailError::Internal(format!(
                        "failed to reacquire lock {}: {e}",
                        path.display()
                    ))
                })?;
                info!(path = %path.display(), pid, "instance lock reclaimed");
                Ok(lock)
            }
            Err(e) => Err(DripmailError::Internal(format!(
                "failed to create lock {}: {e}",
                path.display()
            ))),
        }
    }

    fn try_create(path: &Path, pid: u32) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{pid}")?;
        file.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
            pid,
            released: false,
        })
    }

    /// Deletes the lock file if this process still owns it. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let current = read_owner(&self.path);
        if current == Some(self.pid) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            } else {
                debug!(path = %self.path.display(), "instance lock released");
            }
        } else {
            // Someone else owns it now; leave their file alone.
            warn!(
                path = %self.path.display(),
                owner = ?current,
                "lock file no longer ours, not removing"
            );
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}
