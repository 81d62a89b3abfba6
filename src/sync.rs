// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Writer-liveness locking and reader wait loops.
//!
//! Exactly one writer may hold a flow at a time. The writer takes an
//! exclusive OS file lock on the flow's `data` file for as long as it is
//! attached; because the kernel releases the lock when the owning process
//! dies, a non-blocking probe of the same lock distinguishes a live writer
//! from a stale `writerLive` flag left behind by a crash.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::time;
use crate::{Error, Result};

/// Exclusive write lease on a flow, held for the lifetime of a writer.
pub(crate) struct WriterLock {
    _lock: Flock<File>,
}

impl WriterLock {
    /// Acquires the exclusive writer lock on the flow data file.
    ///
    /// Returns [`Error::WriterBusy`] when another writer currently holds the
    /// flow.
    pub fn acquire(data_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(data_path)
            .map_err(Error::from_fs)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Self { _lock: lock }),
            Err((_, Errno::EAGAIN)) => Err(Error::WriterBusy),
            Err((_, errno)) => Err(Error::Io(std::io::Error::from_raw_os_error(errno as i32))),
        }
    }

    /// Probes whether some process currently holds the writer lock.
    ///
    /// Returns `false` (and immediately releases the probe lock) when the
    /// lock is free, i.e. no live writer exists even if the `writerLive` flag
    /// says otherwise.
    pub fn is_held(data_path: &Path) -> Result<bool> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(data_path)
            .map_err(Error::from_fs)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(_probe) => Ok(false),
            Err((_, Errno::EAGAIN)) => Ok(true),
            Err((_, errno)) => Err(Error::Io(std::io::Error::from_raw_os_error(errno as i32))),
        }
    }
}

/// Spins, then sleeps with exponential backoff, until `ready` returns `true`
/// or the TAI deadline passes.
///
/// Returns `true` if `ready` fired before the deadline. The backoff is
/// capped at one millisecond so a commit is never observed much later than
/// that.
pub(crate) fn wait_until<F: FnMut() -> bool>(deadline_ns: u64, mut ready: F) -> bool {
    let mut sleep_us: u64 = 0;
    loop {
        if ready() {
            return true;
        }
        let now = time::current_time();
        if now >= deadline_ns {
            return false;
        }
        if sleep_us == 0 {
            std::hint::spin_loop();
            sleep_us = 1;
        } else {
            let remaining_us = (deadline_ns - now) / 1_000;
            std::thread::sleep(Duration::from_micros(sleep_us.min(remaining_us.max(1))));
            sleep_us = (sleep_us * 2).min(1_000);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_immediate() {
        assert!(wait_until(0, || true));
    }

    #[test]
    fn wait_until_expires() {
        let deadline = time::current_time() + 2_000_000; // 2 ms
        assert!(!wait_until(deadline, || false));
        assert!(time::current_time() >= deadline);
    }

    #[test]
    fn writer_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"x").unwrap();

        assert!(!WriterLock::is_held(&path).unwrap());
        let lock = WriterLock::acquire(&path).unwrap();
        assert!(WriterLock::is_held(&path).unwrap());
        assert!(matches!(
            WriterLock::acquire(&path),
            Err(Error::WriterBusy)
        ));
        drop(lock);
        assert!(!WriterLock::is_held(&path).unwrap());
    }
}
