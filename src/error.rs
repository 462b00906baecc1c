//! Error types for lsmstore.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::FileDesc;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File descriptor fails the validity predicate.
    #[error("invalid file descriptor")]
    InvalidFile,

    /// The storage is already locked, either by another handle in this
    /// process or by another process holding the LOCK file.
    #[error("storage is already locked")]
    Locked,

    /// Operation attempted after the handle was closed.
    #[error("storage is closed")]
    Closed,

    /// Mutating operation on a read-only handle.
    #[error("storage is read-only")]
    ReadOnly,

    /// The open target exists but is not a directory.
    #[error("open {}: not a directory", .0.display())]
    NotDirectory(PathBuf),

    /// A current-pointer file failed validation.
    #[error("{}", corrupted_message(.fd, .message))]
    Corrupted {
        /// The offending identifier, when it could be parsed.
        fd: Option<FileDesc>,
        /// What was wrong with the candidate.
        message: String,
    },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn corrupted_message(fd: &Option<FileDesc>, message: &str) -> String {
    match fd {
        Some(fd) => format!("{} [file={}]", message, fd),
        None => message.to_string(),
    }
}

impl Error {
    /// Create a corruption error for the given identifier.
    pub fn corrupted(fd: Option<FileDesc>, message: impl Into<String>) -> Self {
        Error::Corrupted {
            fd,
            message: message.into(),
        }
    }

    /// Check if this error indicates corruption.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Error::Corrupted { .. })
    }

    /// Check if this error indicates a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::Locked), "storage is already locked");
        assert_eq!(format!("{}", Error::ReadOnly), "storage is read-only");

        let err = Error::corrupted(None, "corrupted or incomplete CURRENT file");
        assert_eq!(format!("{}", err), "corrupted or incomplete CURRENT file");

        let fd = FileDesc::new(FileKind::Manifest, 5);
        let err = Error::corrupted(Some(fd), "corrupted or incomplete CURRENT file");
        assert_eq!(
            format!("{}", err),
            "corrupted or incomplete CURRENT file [file=MANIFEST-000005]"
        );
    }

    #[test]
    fn test_error_is_corrupted() {
        assert!(Error::corrupted(None, "bad").is_corrupted());
        assert!(!Error::Locked.is_corrupted());
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(Error::NotFound("no CURRENT".into()).is_not_found());
        assert!(Error::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_not_found());
        assert!(!Error::Closed.is_not_found());
    }
}
