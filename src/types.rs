//! File kinds, descriptors, and the on-disk naming scheme.
//!
//! Every file managed by the storage layer is identified by a
//! [`FileDesc`], a (kind, number) pair. The descriptor maps to a
//! canonical filesystem name, and for tables also to a legacy name kept
//! readable for directories written by older releases:
//!
//! | Kind     | Canonical name   | Legacy name  |
//! |----------|------------------|--------------|
//! | Manifest | `MANIFEST-<num>` | —            |
//! | Journal  | `<num>.log`      | —            |
//! | Table    | `<num>.ldb`      | `<num>.sst`  |
//! | Temp     | `<num>.tmp`      | —            |
//!
//! Numbers are zero-padded to width 6 on the write path; any wider
//! non-negative decimal is accepted on the read path.

use std::fmt;
use std::ops::BitOr;

/// Largest file number representable in an on-disk name.
///
/// The name grammar is defined over signed 64-bit decimals, so numbers
/// beyond `i64::MAX` cannot round-trip and are rejected as invalid.
pub const MAX_FILE_NUM: u64 = i64::MAX as u64;

/// File kinds managed by the storage layer.
///
/// Discriminants are powers of two so kinds compose into a [`KindFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileKind {
    /// Manifest file (the authoritative catalog of database state).
    Manifest = 1,
    /// Write-ahead journal segment.
    Journal = 2,
    /// Immutable sorted table file.
    Table = 4,
    /// Temporary file not yet promoted into the catalog.
    Temp = 8,
}

impl FileKind {
    /// Whether this kind has a legacy on-disk name. True only for tables,
    /// which older releases wrote with the `.sst` suffix.
    pub fn has_legacy_name(self) -> bool {
        matches!(self, FileKind::Table)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Manifest => "manifest",
            FileKind::Journal => "journal",
            FileKind::Table => "table",
            FileKind::Temp => "temp",
        };
        f.write_str(name)
    }
}

impl BitOr for FileKind {
    type Output = KindFilter;

    fn bitor(self, rhs: FileKind) -> KindFilter {
        KindFilter(self as u8 | rhs as u8)
    }
}

impl From<FileKind> for KindFilter {
    fn from(kind: FileKind) -> KindFilter {
        KindFilter(kind as u8)
    }
}

/// A set of file kinds, used to filter directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindFilter(u8);

impl KindFilter {
    /// The filter matching every kind.
    pub const ALL: KindFilter = KindFilter(
        FileKind::Manifest as u8 | FileKind::Journal as u8 | FileKind::Table as u8 | FileKind::Temp as u8,
    );

    /// Check whether the filter contains the given kind.
    pub fn contains(self, kind: FileKind) -> bool {
        self.0 & kind as u8 != 0
    }

    /// Check whether the filter matches no kind at all.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KindFilter {
    type Output = KindFilter;

    fn bitor(self, rhs: KindFilter) -> KindFilter {
        KindFilter(self.0 | rhs.0)
    }
}

impl BitOr<FileKind> for KindFilter {
    type Output = KindFilter;

    fn bitor(self, rhs: FileKind) -> KindFilter {
        KindFilter(self.0 | rhs as u8)
    }
}

/// Descriptor of one file managed by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDesc {
    /// The file kind.
    pub kind: FileKind,
    /// The file number.
    pub num: u64,
}

impl FileDesc {
    /// Create a new file descriptor.
    pub fn new(kind: FileKind, num: u64) -> FileDesc {
        FileDesc { kind, num }
    }

    /// Whether this descriptor can be represented as an on-disk name.
    pub fn is_valid(&self) -> bool {
        self.num <= MAX_FILE_NUM
    }

    /// The canonical filesystem name for this descriptor.
    pub fn name(&self) -> String {
        match self.kind {
            FileKind::Manifest => format!("MANIFEST-{:06}", self.num),
            FileKind::Journal => format!("{:06}.log", self.num),
            FileKind::Table => format!("{:06}.ldb", self.num),
            FileKind::Temp => format!("{:06}.tmp", self.num),
        }
    }

    /// The legacy filesystem name for this descriptor. Identical to the
    /// canonical name for kinds without a legacy form.
    pub fn legacy_name(&self) -> String {
        match self.kind {
            FileKind::Table => format!("{:06}.sst", self.num),
            _ => self.name(),
        }
    }

    /// Parse a filesystem name into a descriptor.
    ///
    /// Accepts canonical names and the legacy `<num>.sst` table name.
    /// Returns `None` for anything else.
    pub fn parse_name(name: &str) -> Option<FileDesc> {
        if let Some(digits) = name.strip_prefix("MANIFEST-") {
            let num = parse_num(digits)?;
            return Some(FileDesc::new(FileKind::Manifest, num));
        }

        let (digits, suffix) = name.split_once('.')?;
        let num = parse_num(digits)?;
        let kind = match suffix {
            "log" => FileKind::Journal,
            "ldb" | "sst" => FileKind::Table,
            "tmp" => FileKind::Temp,
            _ => return None,
        };
        Some(FileDesc::new(kind, num))
    }
}

impl fmt::Display for FileDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Parse a non-negative decimal that fits a signed 64-bit integer.
pub(crate) fn parse_num(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(FileDesc::new(FileKind::Manifest, 5).name(), "MANIFEST-000005");
        assert_eq!(FileDesc::new(FileKind::Journal, 123).name(), "000123.log");
        assert_eq!(FileDesc::new(FileKind::Table, 456).name(), "000456.ldb");
        assert_eq!(FileDesc::new(FileKind::Temp, 789).name(), "000789.tmp");

        // Wider than the padding.
        assert_eq!(
            FileDesc::new(FileKind::Journal, 12345678).name(),
            "12345678.log"
        );
    }

    #[test]
    fn test_legacy_names() {
        assert_eq!(FileDesc::new(FileKind::Table, 3).legacy_name(), "000003.sst");
        assert_eq!(FileDesc::new(FileKind::Journal, 3).legacy_name(), "000003.log");

        assert!(FileKind::Table.has_legacy_name());
        assert!(!FileKind::Manifest.has_legacy_name());
        assert!(!FileKind::Journal.has_legacy_name());
        assert!(!FileKind::Temp.has_legacy_name());
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(
            FileDesc::parse_name("MANIFEST-000005"),
            Some(FileDesc::new(FileKind::Manifest, 5))
        );
        assert_eq!(
            FileDesc::parse_name("000123.log"),
            Some(FileDesc::new(FileKind::Journal, 123))
        );
        assert_eq!(
            FileDesc::parse_name("000456.ldb"),
            Some(FileDesc::new(FileKind::Table, 456))
        );
        assert_eq!(
            FileDesc::parse_name("000456.sst"),
            Some(FileDesc::new(FileKind::Table, 456))
        );
        assert_eq!(
            FileDesc::parse_name("000789.tmp"),
            Some(FileDesc::new(FileKind::Temp, 789))
        );

        // Unpadded and over-wide numbers are accepted.
        assert_eq!(
            FileDesc::parse_name("7.log"),
            Some(FileDesc::new(FileKind::Journal, 7))
        );
        assert_eq!(
            FileDesc::parse_name("000000000042.ldb"),
            Some(FileDesc::new(FileKind::Table, 42))
        );

        assert_eq!(FileDesc::parse_name("CURRENT"), None);
        assert_eq!(FileDesc::parse_name("LOCK"), None);
        assert_eq!(FileDesc::parse_name("LOG"), None);
        assert_eq!(FileDesc::parse_name("LOG.old"), None);
        assert_eq!(FileDesc::parse_name("abc.log"), None);
        assert_eq!(FileDesc::parse_name("123.txt"), None);
        assert_eq!(FileDesc::parse_name("123."), None);
        assert_eq!(FileDesc::parse_name(".log"), None);
        assert_eq!(FileDesc::parse_name("-5.log"), None);
        assert_eq!(FileDesc::parse_name("1.log.old"), None);
        assert_eq!(FileDesc::parse_name("MANIFEST-"), None);
        assert_eq!(FileDesc::parse_name("MANIFEST-5x"), None);
        assert_eq!(FileDesc::parse_name("manifest-000001"), None);
    }

    #[test]
    fn test_parse_rejects_overflow() {
        // One past i64::MAX.
        assert_eq!(FileDesc::parse_name("9223372036854775808.log"), None);
        assert_eq!(
            FileDesc::parse_name("9223372036854775807.log"),
            Some(FileDesc::new(FileKind::Journal, MAX_FILE_NUM))
        );
    }

    #[test]
    fn test_roundtrip() {
        for kind in [FileKind::Manifest, FileKind::Journal, FileKind::Table, FileKind::Temp] {
            for num in [0, 1, 6, 999999, 1000000, MAX_FILE_NUM] {
                let fd = FileDesc::new(kind, num);
                assert_eq!(FileDesc::parse_name(&fd.name()), Some(fd));
                assert_eq!(FileDesc::parse_name(&fd.legacy_name()), Some(fd));
            }
        }
    }

    #[test]
    fn test_validity() {
        assert!(FileDesc::new(FileKind::Table, 0).is_valid());
        assert!(FileDesc::new(FileKind::Table, MAX_FILE_NUM).is_valid());
        assert!(!FileDesc::new(FileKind::Table, MAX_FILE_NUM + 1).is_valid());
    }

    #[test]
    fn test_kind_filter() {
        let filter = FileKind::Manifest | FileKind::Table;
        assert!(filter.contains(FileKind::Manifest));
        assert!(filter.contains(FileKind::Table));
        assert!(!filter.contains(FileKind::Journal));
        assert!(!filter.contains(FileKind::Temp));

        let filter = filter | FileKind::Journal;
        assert!(filter.contains(FileKind::Journal));

        assert!(KindFilter::ALL.contains(FileKind::Temp));
        assert!(!KindFilter::from(FileKind::Temp).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(FileDesc::new(FileKind::Manifest, 7).to_string(), "MANIFEST-000007");
        assert_eq!(FileKind::Journal.to_string(), "journal");
    }
}
