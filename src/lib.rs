//! # lsmstore
//!
//! The persistent, directory-backed storage layer of an LSM-tree
//! database. It turns an opaque filesystem directory into a namespace
//! of typed, numbered files with:
//!
//! - **Exclusive-writer semantics**: an advisory lock on the `LOCK`
//!   file keeps one read-write handle per directory across processes,
//!   plus an in-process instance lock for the engine itself
//! - **Crash-consistent pointer updates**: the `CURRENT` file naming
//!   the authoritative manifest is published through a synced side file
//!   and an atomic rename, and recovery after a crash mid-publication
//!   is automatic
//! - **A typed file namespace**: manifests, journals, tables, and temp
//!   files with canonical names and a legacy fallback for old tables
//! - **An operational diary**: non-fatal anomalies land in a rotating
//!   `LOG` file
//!
//! File content is opaque to this layer; journal records, table blocks,
//! and manifest edits belong to the engine above it.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lsmstore::{FileDesc, FileKind, FileStorage, KindFilter};
//!
//! let storage = FileStorage::open("./db", false)?;
//! let _guard = storage.lock()?;
//!
//! // Write a manifest, then publish it as current.
//! let fd = FileDesc::new(FileKind::Manifest, 1);
//! let mut writer = storage.create(fd)?;
//! writer.write_all(b"...")?;
//! writer.sync()?;
//! writer.close()?;
//! storage.set_meta(fd)?;
//!
//! // Later, possibly after a crash:
//! let current = storage.get_meta()?;
//! let tables = storage.list(KindFilter::from(FileKind::Table))?;
//! storage.close()?;
//! ```

// Public modules
pub mod error;
pub mod types;

// Internal modules
mod file;
mod flock;
mod info_log;
mod meta;
mod storage;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use types::{FileDesc, FileKind, KindFilter, MAX_FILE_NUM};

pub use file::{FileReader, FileWriter};
pub use storage::{FileStorage, StorageLock};
