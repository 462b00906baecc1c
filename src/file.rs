//! File handles and filesystem primitives.
//!
//! Readers and writers minted by [`FileStorage`](crate::FileStorage) each
//! hold one open slot in the storage's handle count. Closing a handle
//! releases its slot exactly once; a second close returns
//! [`Error::Closed`]. Dropping an unclosed handle performs the same
//! bookkeeping silently.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::IntoRawFd;
use std::path::Path;
use std::sync::Arc;

use crate::storage::StorageCore;
use crate::types::{FileDesc, FileKind};
use crate::{Error, Result};

/// Read-only handle over one storage file.
///
/// Supports sequential reads, seeking, and positioned reads.
pub struct FileReader {
    core: Arc<StorageCore>,
    fd: FileDesc,
    file: Option<File>,
}

impl FileReader {
    pub(crate) fn new(core: Arc<StorageCore>, fd: FileDesc, file: File) -> FileReader {
        FileReader {
            core,
            fd,
            file: Some(file),
        }
    }

    /// The descriptor this handle was opened for.
    pub fn file_desc(&self) -> FileDesc {
        self.fd
    }

    /// Read into `buf` at the given byte offset, without moving the
    /// sequential cursor.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file.as_ref().ok_or(Error::Closed)?;
        Ok(file.read_at(buf, offset)?)
    }

    /// Close the handle and release its open slot.
    pub fn close(&mut self) -> Result<()> {
        close_handle(&self.core, self.fd, &mut self.file)
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Err(closed_io()),
        }
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.file.as_mut() {
            Some(file) => file.seek(pos),
            None => Err(closed_io()),
        }
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.close();
        }
    }
}

/// Write-only handle over one storage file.
pub struct FileWriter {
    core: Arc<StorageCore>,
    fd: FileDesc,
    file: Option<File>,
}

impl FileWriter {
    pub(crate) fn new(core: Arc<StorageCore>, fd: FileDesc, file: File) -> FileWriter {
        FileWriter {
            core,
            fd,
            file: Some(file),
        }
    }

    /// The descriptor this handle was opened for.
    pub fn file_desc(&self) -> FileDesc {
        self.fd
    }

    /// Commit the file's contents to stable storage.
    ///
    /// For manifest files the containing directory is synced as well, so
    /// the file's directory entry is durable before the current pointer
    /// can reference it. Filesystems that reject directory fsync with
    /// `EINVAL` get a note in the operational log and the sync succeeds.
    pub fn sync(&mut self) -> Result<()> {
        let file = self.file.as_ref().ok_or(Error::Closed)?;
        file.sync_all()?;

        if self.fd.kind == FileKind::Manifest {
            if let Err(e) = sync_dir(&self.core.path) {
                let mut state = self.core.state.lock();
                state.log.write(&format!("sync dir: {}", e));
                if !is_sync_unsupported(&e) {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Close the handle and release its open slot.
    pub fn close(&mut self) -> Result<()> {
        close_handle(&self.core, self.fd, &mut self.file)
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(closed_io()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Err(closed_io()),
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.close();
        }
    }
}

fn closed_io() -> io::Error {
    io::Error::new(io::ErrorKind::Other, Error::Closed)
}

/// Close the descriptor, release the handle's open slot, and surface any
/// close error. The count never drops below zero even when the storage
/// was closed underneath the handle.
fn close_handle(core: &StorageCore, fd: FileDesc, slot: &mut Option<File>) -> Result<()> {
    let file = slot.take().ok_or(Error::Closed)?;

    let mut state = core.state.lock();
    if state.open_files > 0 {
        state.open_files -= 1;
    }

    // std drops close errors on the floor; go through close(2) so they
    // stay observable.
    let rc = unsafe { libc::close(file.into_raw_fd()) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        state.log.write(&format!("close {}: {}", fd, err));
        return Err(err.into());
    }
    Ok(())
}

/// Write `data` to `path` (create + truncate, given mode), fsync, and
/// close, surfacing the first error of any step.
pub(crate) fn write_file_synced(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()?;

    let rc = unsafe { libc::close(file.into_raw_fd()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Fsync a directory so renames and unlinks inside it are durable.
pub(crate) fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

/// Whether a directory-sync failure means the filesystem does not
/// support fsync on directories at all.
pub(crate) fn is_sync_unsupported(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINVAL)
}
