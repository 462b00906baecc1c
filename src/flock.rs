//! Advisory whole-directory lock.
//!
//! Inter-process exclusion over a storage directory is witnessed by an
//! advisory `flock` on the `LOCK` file inside it: shared for read-only
//! handles, exclusive for read-write handles, always non-blocking. A
//! crashed holder's lock is released by the OS when its descriptors go
//! away.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::{Error, Result};

/// Holds the advisory lock on a storage directory's LOCK file.
///
/// The lock is released when the value is dropped. The LOCK file itself
/// is left in place; removing it would race other openers.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Open (creating if absent, mode 0644) and lock the given LOCK file.
    ///
    /// Returns [`Error::Locked`] if an incompatible lock is already held.
    pub(crate) fn acquire(path: &Path, read_only: bool) -> Result<FileLock> {
        let mut opts = OpenOptions::new();
        if read_only {
            opts.read(true);
        } else {
            opts.read(true).write(true);
        }

        let file = match opts.open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Creation needs write access even when the lock itself
                // will be shared.
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .mode(0o644)
                    .open(path)?
            }
            Err(e) => return Err(e.into()),
        };

        let how = if read_only { libc::LOCK_SH } else { libc::LOCK_EX };
        flock(&file, how | libc::LOCK_NB)?;

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The descriptor close would release the lock anyway; unlocking
        // explicitly keeps the release visible to strace and tests.
        let _ = flock(&self.file, libc::LOCK_UN);
    }
}

fn flock(file: &File, how: libc::c_int) -> Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), how) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Err(Error::Locked);
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let lock = FileLock::acquire(&path, false).unwrap();
        assert!(path.exists());
        drop(lock);
    }

    #[test]
    fn test_exclusive_excludes_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let _lock = FileLock::acquire(&path, false).unwrap();
        // flock conflicts apply between descriptors, so a second acquire
        // in the same process observes the held lock.
        match FileLock::acquire(&path, false) {
            Err(Error::Locked) => {}
            other => panic!("expected Locked, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_exclusive_excludes_shared() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let _lock = FileLock::acquire(&path, false).unwrap();
        match FileLock::acquire(&path, true) {
            Err(Error::Locked) => {}
            other => panic!("expected Locked, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shared_allows_shared() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let _a = FileLock::acquire(&path, true).unwrap();
        let _b = FileLock::acquire(&path, true).unwrap();
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        {
            let _lock = FileLock::acquire(&path, false).unwrap();
        }
        let _again = FileLock::acquire(&path, false).unwrap();
    }
}
