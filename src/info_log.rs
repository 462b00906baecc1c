//! The operational LOG writer.
//!
//! An append-only, human-readable diary at `<dir>/LOG` where every
//! component reports non-fatal anomalies. Each line carries a local
//! time-of-day prefix, a banner marks day changes, and the file rotates
//! to `LOG.old` once it exceeds 1 MiB. Writes are best-effort: no error
//! here ever reaches a caller.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Timelike};

use crate::Result;

/// Rotation threshold for LOG (1 MiB).
const LOG_SIZE_THRESHOLD: u64 = 1024 * 1024;

/// Writer for the operational LOG file.
///
/// Callers must serialize access externally; the storage layer keeps the
/// writer inside its directory-mutex-guarded state.
#[derive(Debug)]
pub(crate) struct InfoLog {
    dir: PathBuf,
    enabled: bool,
    file: Option<File>,
    size: u64,
    /// Day-of-month of the last write; 0 forces a banner.
    day: u32,
}

impl InfoLog {
    /// Open the LOG file for appending. In read-only mode nothing is
    /// opened and every write is a no-op.
    pub(crate) fn open(dir: &Path, read_only: bool) -> Result<InfoLog> {
        if read_only {
            return Ok(InfoLog {
                dir: dir.to_path_buf(),
                enabled: false,
                file: None,
                size: 0,
                day: 0,
            });
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(dir.join("LOG"))?;
        let size = file.metadata()?.len();

        Ok(InfoLog {
            dir: dir.to_path_buf(),
            enabled: true,
            file: Some(file),
            size,
            day: 0,
        })
    }

    /// Append one line, rotating first if the file has grown past the
    /// threshold. Failures are silent.
    pub(crate) fn write(&mut self, msg: &str) {
        if !self.enabled {
            return;
        }

        if self.size > LOG_SIZE_THRESHOLD {
            self.file = None;
            self.size = 0;
            if fs::rename(self.dir.join("LOG"), self.dir.join("LOG.old")).is_err() {
                return;
            }
        }

        if self.file.is_none() {
            let file = match OpenOptions::new()
                .append(true)
                .create(true)
                .mode(0o644)
                .open(self.dir.join("LOG"))
            {
                Ok(f) => f,
                Err(_) => return,
            };
            self.file = Some(file);
            self.day = 0;
        }

        let now = Local::now();
        let Some(file) = self.file.as_mut() else {
            return;
        };

        if self.day != now.day() {
            self.day = now.day();
            let banner = format!(
                "==============={}===============\n",
                now.format("%b %-d, %Y (%Z)")
            );
            if file.write_all(banner.as_bytes()).is_err() {
                return;
            }
        }

        let line = format!(
            "{:02}:{:02}:{:02}.{:06} {}\n",
            now.hour(),
            now.minute(),
            now.second(),
            now.nanosecond() / 1_000,
            msg
        );
        if file.write_all(line.as_bytes()).is_ok() {
            self.size += line.len() as u64;
        }
    }

    /// Stop logging and close the LOG file. Further writes are dropped.
    pub(crate) fn shutdown(&mut self) {
        self.enabled = false;
        self.file = None;
    }
}
