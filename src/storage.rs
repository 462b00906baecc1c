//! The directory-backed storage handle.
//!
//! [`FileStorage`] binds to one filesystem directory and turns it into a
//! namespace of typed, numbered files with exclusive-writer semantics.
//! It coordinates:
//! - the advisory LOCK file for inter-process exclusion
//! - an in-process instance lock layered above it
//! - reader/writer handles with open-slot bookkeeping
//! - the current-manifest pointer (see the meta module)
//! - the operational LOG diary
//!
//! # Thread safety
//!
//! One internal mutex serializes every state-changing or
//! consistency-sensitive operation. The handle can be shared across
//! threads behind an `Arc`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::file::{FileReader, FileWriter};
use crate::flock::FileLock;
use crate::info_log::InfoLog;
use crate::types::{FileDesc, KindFilter};
use crate::{Error, Result};

/// Shared core behind a [`FileStorage`] and the handles it mints.
#[derive(Debug)]
pub(crate) struct StorageCore {
    /// The bound directory.
    pub(crate) path: PathBuf,
    /// Whether the handle was opened read-only.
    pub(crate) read_only: bool,
    /// The directory mutex guarding all mutable state.
    pub(crate) state: Mutex<State>,
}

/// Mutable state guarded by the directory mutex.
#[derive(Debug)]
pub(crate) struct State {
    /// Count of live file handles; `-1` once the storage is closed.
    pub(crate) open_files: i64,
    /// Whether the in-process instance lock is currently held.
    pub(crate) instance_locked: bool,
    /// The advisory lock on `<dir>/LOCK`, released on close.
    pub(crate) flock: Option<FileLock>,
    /// The operational LOG writer.
    pub(crate) log: InfoLog,
}

impl StorageCore {
    /// Fail with [`Error::Closed`] once the open count is poisoned.
    pub(crate) fn check_open(state: &State) -> Result<()> {
        if state.open_files < 0 {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// Handle over one storage directory.
///
/// Opening acquires the whole-directory advisory lock; dropping the
/// handle (or calling [`close`](FileStorage::close)) releases it.
#[derive(Debug)]
pub struct FileStorage {
    pub(crate) core: Arc<StorageCore>,
}

impl FileStorage {
    /// Open a storage directory.
    ///
    /// In read-write mode a missing directory is created with mode
    /// `0755` and the advisory lock is taken exclusive; in read-only
    /// mode a missing directory is an error and the lock is shared.
    /// Fails with [`Error::Locked`] when another process holds an
    /// incompatible lock.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<FileStorage> {
        let path = path.as_ref().to_path_buf();

        match fs::metadata(&path) {
            Ok(meta) if !meta.is_dir() => return Err(Error::NotDirectory(path)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && !read_only => {
                fs::DirBuilder::new().recursive(true).mode(0o755).create(&path)?;
            }
            Err(e) => return Err(e.into()),
        }

        let flock = FileLock::acquire(&path.join("LOCK"), read_only)?;
        // If opening LOG fails the flock drops here, releasing the lock.
        let log = InfoLog::open(&path, read_only)?;

        Ok(FileStorage {
            core: Arc::new(StorageCore {
                path,
                read_only,
                state: Mutex::new(State {
                    open_files: 0,
                    instance_locked: false,
                    flock: Some(flock),
                    log,
                }),
            }),
        })
    }

    /// The directory this handle is bound to.
    pub fn path(&self) -> &Path {
        &self.core.path
    }

    /// Whether the handle was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.core.read_only
    }

    /// Acquire the in-process instance lock.
    ///
    /// Returns [`Error::Locked`] while another handle from this storage
    /// is held. In read-only mode the returned lock is a no-op; the
    /// filesystem lock is the real exclusion.
    pub fn lock(&self) -> Result<StorageLock> {
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        if self.core.read_only {
            return Ok(StorageLock { core: Weak::new() });
        }
        if state.instance_locked {
            return Err(Error::Locked);
        }
        state.instance_locked = true;
        Ok(StorageLock {
            core: Arc::downgrade(&self.core),
        })
    }

    /// Append a line to the operational LOG. Best-effort; a no-op in
    /// read-only mode or after close.
    pub fn log(&self, msg: &str) {
        if self.core.read_only {
            return;
        }
        let mut state = self.core.state.lock();
        if state.open_files < 0 {
            return;
        }
        state.log.write(msg);
    }

    /// List the identifiers present in the directory whose kind is in
    /// the filter. Order is unspecified.
    pub fn list(&self, filter: KindFilter) -> Result<Vec<FileDesc>> {
        let state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        let mut fds = Vec::new();
        for entry in fs::read_dir(&self.core.path)? {
            let entry = entry?;
            if let Some(fd) = FileDesc::parse_name(&entry.file_name().to_string_lossy()) {
                if filter.contains(fd.kind) {
                    fds.push(fd);
                }
            }
        }
        Ok(fds)
    }

    /// Open a file read-only.
    ///
    /// For tables, a missing canonical `.ldb` name falls back to the
    /// legacy `.sst` name.
    pub fn open_file(&self, fd: FileDesc) -> Result<FileReader> {
        if !fd.is_valid() {
            return Err(Error::InvalidFile);
        }
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        let file = match File::open(self.core.path.join(fd.name())) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound && fd.kind.has_legacy_name() => {
                File::open(self.core.path.join(fd.legacy_name()))?
            }
            Err(e) => return Err(e.into()),
        };

        state.open_files += 1;
        Ok(FileReader::new(Arc::clone(&self.core), fd, file))
    }

    /// Create a file write-only, truncating any existing content.
    /// Mode `0644`. Rejected on read-only handles.
    pub fn create(&self, fd: FileDesc) -> Result<FileWriter> {
        if !fd.is_valid() {
            return Err(Error::InvalidFile);
        }
        if self.core.read_only {
            return Err(Error::ReadOnly);
        }
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(self.core.path.join(fd.name()))?;

        state.open_files += 1;
        Ok(FileWriter::new(Arc::clone(&self.core), fd, file))
    }

    /// Remove a file. For tables, a missing canonical name falls back
    /// to the legacy `.sst` name; if that is missing too, the original
    /// not-found error surfaces.
    pub fn remove(&self, fd: FileDesc) -> Result<()> {
        if !fd.is_valid() {
            return Err(Error::InvalidFile);
        }
        if self.core.read_only {
            return Err(Error::ReadOnly);
        }
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        match fs::remove_file(self.core.path.join(fd.name())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && fd.kind.has_legacy_name() => {
                match fs::remove_file(self.core.path.join(fd.legacy_name())) {
                    Ok(()) => {
                        state.log.write(&format!("remove {}: {} (old name)", fd, e));
                        Ok(())
                    }
                    Err(e1) if e1.kind() == io::ErrorKind::NotFound => Err(e.into()),
                    Err(e1) => {
                        state.log.write(&format!("remove {}: {} (old name)", fd, e1));
                        Err(e1.into())
                    }
                }
            }
            Err(e) => {
                state.log.write(&format!("remove {}: {}", fd, e));
                Err(e.into())
            }
        }
    }

    /// Rename between canonical names. A same-descriptor rename is a
    /// no-op. Rejected on read-only handles.
    pub fn rename(&self, old: FileDesc, new: FileDesc) -> Result<()> {
        if !old.is_valid() || !new.is_valid() {
            return Err(Error::InvalidFile);
        }
        if old == new {
            return Ok(());
        }
        if self.core.read_only {
            return Err(Error::ReadOnly);
        }
        let state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        fs::rename(
            self.core.path.join(old.name()),
            self.core.path.join(new.name()),
        )?;
        Ok(())
    }

    /// Close the storage: poison the open count, shut the LOG writer,
    /// and release the directory lock. A second close returns
    /// [`Error::Closed`]. Live file handles are warned about in the LOG
    /// but do not block closing.
    pub fn close(&self) -> Result<()> {
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        if state.open_files > 0 {
            let msg = format!("close: warning, {} files still open", state.open_files);
            state.log.write(&msg);
        }
        state.open_files = -1;
        state.log.shutdown();
        state.flock = None;
        Ok(())
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Handle for the in-process instance lock.
///
/// Releases on drop; [`unlock`](StorageLock::unlock) is the explicit
/// spelling. Holds only a weak reference to the storage, so releasing
/// after the storage closed is a no-op.
pub struct StorageLock {
    core: Weak<StorageCore>,
}

impl StorageLock {
    /// Release the instance lock.
    pub fn unlock(self) {}
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            let mut state = core.state.lock();
            state.instance_locked = false;
        }
    }
}
