//! Current-manifest pointer publication and recovery.
//!
//! The `CURRENT` file names the authoritative manifest. Publication
//! writes the new pointer to a synced `CURRENT.<num>` side file first
//! and only then renames it over `CURRENT`, so a crash at any point
//! leaves either the old pointer or a fully-synced pending one.
//! Resolution scans pending pointers (highest number first) alongside
//! `CURRENT`/`CURRENT.bak`, picks the newest valid candidate, and in
//! read-write mode repairs the directory back to the fast path:
//! republish the winner, then garbage-collect the pending files.

use std::fs;
use std::io;

use crate::file::{is_sync_unsupported, sync_dir, write_file_synced};
use crate::storage::{FileStorage, State, StorageCore};
use crate::types::{parse_num, FileDesc};
use crate::{Error, Result};

const CURRENT: &str = "CURRENT";
const CURRENT_BAK: &str = "CURRENT.bak";

/// A pointer candidate that passed validation.
struct Candidate {
    /// The file it was read from.
    name: String,
    /// The manifest it references.
    fd: FileDesc,
}

/// Outcome of probing one pointer candidate.
enum Probe {
    /// The candidate (or its target manifest) does not exist.
    Missing,
    /// The candidate exists but its content failed validation.
    Corrupted(Error),
    /// An unexpected filesystem error; aborts resolution verbatim.
    Fatal(Error),
}

impl FileStorage {
    /// Publish `fd` as the current manifest.
    ///
    /// Idempotent: when `CURRENT` already holds exactly this pointer,
    /// nothing is written. Otherwise the pointer goes through a synced
    /// `CURRENT.<num>` file and an atomic rename, so a crash never
    /// leaves a torn `CURRENT`.
    pub fn set_meta(&self, fd: FileDesc) -> Result<()> {
        if !fd.is_valid() {
            return Err(Error::InvalidFile);
        }
        if self.core.read_only {
            return Err(Error::ReadOnly);
        }
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        self.core.set_meta_locked(&mut state, fd)
    }

    /// Resolve the current manifest.
    ///
    /// Prefers the highest-numbered valid pending pointer over the
    /// canonical `CURRENT`/`CURRENT.bak` pair, because a pending file
    /// only exists if its content was fully synced before a crashed
    /// rename. In read-write mode the winner is republished and
    /// superseded pending files are removed.
    pub fn get_meta(&self) -> Result<FileDesc> {
        let mut state = self.core.state.lock();
        StorageCore::check_open(&state)?;

        self.core.get_meta_locked(&mut state)
    }
}

impl StorageCore {
    pub(crate) fn set_meta_locked(&self, state: &mut State, fd: FileDesc) -> Result<()> {
        let content = format!("{}\n", fd.name());
        let current = self.path.join(CURRENT);

        match fs::read(&current) {
            Ok(existing) if existing == content.as_bytes() => return Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                state.log.write(&format!("read CURRENT: {}", e));
                return Err(e.into());
            }
        }

        let pending = self.path.join(format!("CURRENT.{}", fd.num));
        if let Err(e) = write_file_synced(&pending, content.as_bytes(), 0o644) {
            state.log.write(&format!("create CURRENT.{}: {}", fd.num, e));
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&pending, &current) {
            state.log.write(&format!("rename CURRENT.{}: {}", fd.num, e));
            return Err(e.into());
        }

        if let Err(e) = sync_dir(&self.path) {
            state.log.write(&format!("sync dir: {}", e));
            if !is_sync_unsupported(&e) {
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn get_meta_locked(&self, state: &mut State) -> Result<FileDesc> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }

        // Pending pointers, highest number first.
        let mut nums: Vec<u64> = names
            .iter()
            .filter(|name| name.as_str() != CURRENT_BAK)
            .filter_map(|name| name.strip_prefix("CURRENT."))
            .filter_map(parse_num)
            .collect();
        nums.sort_unstable_by(|a, b| b.cmp(a));
        let pend_names: Vec<String> = nums.iter().map(|n| format!("CURRENT.{}", n)).collect();

        let mut pend_winner = None;
        let mut pend_corrupted = None;
        if !pend_names.is_empty() {
            match self.try_currents(state, &pend_names) {
                Ok(cand) => pend_winner = Some(cand),
                Err(Probe::Corrupted(e)) => pend_corrupted = Some(e),
                Err(Probe::Missing) => {}
                Err(Probe::Fatal(e)) => return Err(e),
            }
        }

        let canonical = [CURRENT.to_string(), CURRENT_BAK.to_string()];
        let mut cur_winner = None;
        let mut cur_corrupted = None;
        match self.try_currents(state, &canonical) {
            Ok(cand) => cur_winner = Some(cand),
            Err(Probe::Corrupted(e)) => cur_corrupted = Some(e),
            Err(Probe::Missing) => {}
            Err(Probe::Fatal(e)) => return Err(e),
        }

        // A valid pending pointer wins only if it is strictly newer
        // than the canonical one.
        let winner = match (pend_winner, cur_winner) {
            (Some(pend), Some(cur)) => Some(if pend.fd.num > cur.fd.num { pend } else { cur }),
            (Some(pend), None) => Some(pend),
            (None, cur) => cur,
        };

        let Some(winner) = winner else {
            if let Some(e) = pend_corrupted {
                return Err(e);
            }
            if let Some(e) = cur_corrupted {
                return Err(e);
            }
            return Err(Error::NotFound(format!(
                "no valid CURRENT file in {}",
                self.path.display()
            )));
        };

        // Repair: promote a winner that did not come from CURRENT and
        // garbage-collect pending survivors.
        if !self.read_only && (winner.name != CURRENT || !pend_names.is_empty()) {
            if self.set_meta_locked(state, winner.fd).is_ok() {
                for name in &pend_names {
                    if let Err(e) = fs::remove_file(self.path.join(name)) {
                        state.log.write(&format!("remove {}: {}", name, e));
                    }
                }
            }
        }

        Ok(winner.fd)
    }

    /// Probe `name` as a pointer candidate: it must exist, end in a
    /// newline, parse to an identifier, and reference a manifest that
    /// exists on disk.
    fn try_current(&self, state: &mut State, name: &str) -> std::result::Result<Candidate, Probe> {
        let content = match fs::read(self.path.join(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Probe::Missing),
            Err(e) => return Err(Probe::Fatal(e.into())),
        };

        let fd = match parse_pointer(&content) {
            Some(fd) => fd,
            None => {
                state.log.write(&format!(
                    "{}: corrupted content: {:?}",
                    name,
                    String::from_utf8_lossy(&content)
                ));
                return Err(Probe::Corrupted(Error::corrupted(
                    None,
                    "corrupted or incomplete CURRENT file",
                )));
            }
        };

        match fs::metadata(self.path.join(fd.name())) {
            Ok(_) => Ok(Candidate {
                name: name.to_string(),
                fd,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                state.log.write(&format!("{}: missing target file: {}", name, fd));
                Err(Probe::Missing)
            }
            Err(e) => Err(Probe::Fatal(e.into())),
        }
    }

    /// Probe candidates in order until one succeeds. Missing entries
    /// fall through; corrupted entries are remembered but do not halt
    /// the scan; any other error aborts immediately.
    fn try_currents(
        &self,
        state: &mut State,
        names: &[String],
    ) -> std::result::Result<Candidate, Probe> {
        let mut corrupted = None;
        for name in names {
            match self.try_current(state, name) {
                Ok(cand) => return Ok(cand),
                Err(Probe::Missing) => {}
                Err(Probe::Corrupted(e)) => corrupted = Some(e),
                Err(fatal) => return Err(fatal),
            }
        }
        match corrupted {
            Some(e) => Err(Probe::Corrupted(e)),
            None => Err(Probe::Missing),
        }
    }
}

/// Parse the byte content of a pointer file: `<canonical-name>\n`.
fn parse_pointer(content: &[u8]) -> Option<FileDesc> {
    let (last, rest) = content.split_last()?;
    if *last != b'\n' {
        return None;
    }
    let name = std::str::from_utf8(rest).ok()?;
    FileDesc::parse_name(name)
}
