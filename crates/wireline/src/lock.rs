// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-instance process lock.
//!
//! An advisory exclusive flock on a lock file beside the database, held for
//! the process lifetime, with the owner's PID written inside for operators.
//! A second bridge against the same database must fail fast: two pollers
//! would race each other for inbound messages.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tracing::debug;
use wireline_core::WirelineError;

/// Held for the process lifetime; dropping releases the lock.
pub struct ProcessLock {
    _lock: Flock<std::fs::File>,
    path: PathBuf,
}

impl ProcessLock {
    /// Acquires the exclusive lock, writing our PID into the file.
    ///
    /// Fails immediately (no blocking) when another bridge holds it.
    pub fn acquire(path: &Path) -> Result<Self, WirelineError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                WirelineError::Config(format!("cannot open lock file {}: {e}", path.display()))
            })?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) => {
                return Err(WirelineError::Config(format!(
                    "another wireline instance appears to be running (lock {} busy: {errno})",
                    path.display()
                )));
            }
        };

        lock.set_len(0).map_err(|e| {
            WirelineError::Config(format!("cannot truncate lock file: {e}"))
        })?;
        writeln!(lock, "{}", std::process::id()).map_err(|e| {
            WirelineError::Config(format!("cannot write PID to lock file: {e}"))
        })?;

        debug!(path = %path.display(), "process lock acquired");
        Ok(Self {
            _lock: lock,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_writes_pid_and_excludes_second_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wireline.lock");

        let lock = ProcessLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        // Same process, second flock on the same file: still excluded,
        // because the first descriptor holds the lock.
        assert!(ProcessLock::acquire(&path).is_err());

        drop(lock);
        // Released: acquirable again.
        assert!(ProcessLock::acquire(&path).is_ok());
    }
}
