//! Parsed cabinet directory model
//!
//! Folders and files live in index-stable arenas (`Vec`s) owned by the set;
//! every "link" between them is an index into an arena, never a pointer.
//! Merging two sets rebases the right-hand indices and can never leave a
//! dangling reference behind.

use cabaret_codecs::CompressionMethod;

/// File attribute bits.
pub mod attributes {
    /// File is read-only.
    pub const READ_ONLY: u16 = 0x01;
    /// File is hidden.
    pub const HIDDEN: u16 = 0x02;
    /// File is a system file.
    pub const SYSTEM: u16 = 0x04;
    /// Archive bit: file modified since last backup.
    pub const ARCHIVE: u16 = 0x20;
    /// File is executable.
    pub const EXEC: u16 = 0x40;
    /// Name is encoded as UTF-8 rather than the OEM code page.
    pub const NAME_IS_UTF8: u16 = 0x80;
}

/// Metadata of one physical cabinet file.
#[derive(Debug, Clone)]
pub struct PartDetails {
    /// Offset of the cabinet within its containing file (nonzero for
    /// embedded cabinets found by the scanner).
    pub base_offset: u64,
    /// Cabinet's self-declared total length in bytes.
    pub total_size: u32,
    /// Arbitrary number grouping the cabinets of one set.
    pub set_id: u16,
    /// Zero-based index of this cabinet within its set.
    pub set_index: u16,
    /// Per-block reserve bytes between block header and payload.
    pub data_reserve_size: u8,
    /// Application-defined reserve data from the primary header.
    pub header_reserve: Vec<u8>,
    /// Name and disk label of the previous cabinet in the set, if declared.
    pub prev_cabinet: Option<CabinetLabel>,
    /// Name and disk label of the next cabinet in the set, if declared.
    pub next_cabinet: Option<CabinetLabel>,
}

/// Name and disk label of an adjacent cabinet in a multi-part set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetLabel {
    /// Cabinet file name.
    pub name: String,
    /// Human-readable disk label.
    pub disk: String,
}

/// The portion of a folder's compressed data residing in one physical part.
#[derive(Debug, Clone)]
pub struct SpanPart {
    /// Index of the owning part within the set.
    pub part: usize,
    /// Offset of the first block header, relative to the part's base offset.
    pub data_offset: u64,
    /// Number of physical blocks stored in this part.
    pub blocks: u16,
}

/// A compressed span holding zero or more logical files.
#[derive(Debug, Clone)]
pub struct Folder {
    pub(crate) method: CompressionMethod,
    pub(crate) total_blocks: u32,
    pub(crate) spans: Vec<SpanPart>,
    /// Data begins in an earlier cabinet that has not been merged in.
    pub(crate) missing_predecessor: bool,
    /// Files continuing into the next cabinet, in directory order.
    /// Merge anchors; only consulted while joining adjacent parts.
    pub(crate) continued_to_next: Vec<usize>,
    /// Files continued from the previous cabinet, in directory order.
    pub(crate) continued_from_prev: Vec<usize>,
}

impl Folder {
    /// Compression method and parameters for this folder.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Total physical blocks across all merged parts.
    pub fn block_count(&self) -> u32 {
        self.total_blocks
    }

    /// Physical span parts, in stream order.
    pub fn spans(&self) -> &[SpanPart] {
        &self.spans
    }

    /// True if the folder needs a predecessor cabinet that is not present.
    ///
    /// Extraction from such a folder is refused until the earlier part is
    /// merged in with [`super::CabinetSet::prepend`].
    pub fn missing_predecessor(&self) -> bool {
        self.missing_predecessor
    }

    /// Maximum uncompressed capacity: blocks times the block payload limit.
    pub fn capacity(&self) -> u64 {
        u64::from(self.total_blocks) * 32768
    }
}

/// One logical file stored in a folder.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub(crate) name: String,
    pub(crate) length: u32,
    pub(crate) folder_offset: u32,
    pub(crate) attributes: u16,
    pub(crate) date: u16,
    pub(crate) time: u16,
    /// Arena index of the owning folder.
    pub(crate) folder: usize,
}

impl FileEntry {
    /// File name as stored in the directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed length in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Uncompressed byte offset within the owning folder's stream.
    pub fn folder_offset(&self) -> u32 {
        self.folder_offset
    }

    /// Arena index of the owning folder.
    pub fn folder(&self) -> usize {
        self.folder
    }

    /// Raw attribute bits.
    pub fn attributes(&self) -> u16 {
        self.attributes
    }

    /// True if the read-only attribute is set.
    pub fn is_read_only(&self) -> bool {
        self.attributes & attributes::READ_ONLY != 0
    }

    /// True if the hidden attribute is set.
    pub fn is_hidden(&self) -> bool {
        self.attributes & attributes::HIDDEN != 0
    }

    /// True if the system attribute is set.
    pub fn is_system(&self) -> bool {
        self.attributes & attributes::SYSTEM != 0
    }

    /// Modification timestamp decoded from the DOS date/time fields.
    pub fn date_time(&self) -> DosDateTime {
        DosDateTime {
            year: 1980 + (self.date >> 9),
            month: ((self.date >> 5) & 0x0F) as u8,
            day: (self.date & 0x1F) as u8,
            hour: (self.time >> 11) as u8,
            minute: ((self.time >> 5) & 0x3F) as u8,
            second: ((self.time & 0x1F) * 2) as u8,
        }
    }
}

/// Calendar fields of a DOS date/time stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    /// Full year (1980-based storage).
    pub year: u16,
    /// Month, 1..=12.
    pub month: u8,
    /// Day of month, 1..=31.
    pub day: u8,
    /// Hour, 0..=23.
    pub hour: u8,
    /// Minute, 0..=59.
    pub minute: u8,
    /// Second, rounded to 2-second granularity.
    pub second: u8,
}

/// A fully linked single-cabinet directory.
///
/// Produced by the header reader; folded into a [`super::CabinetSet`] for
/// extraction and merging. The scanner yields these for embedded cabinets
/// because the scanned source cannot be handed to every hit at once.
#[derive(Debug)]
pub struct Directory {
    pub(crate) details: PartDetails,
    pub(crate) folders: Vec<Folder>,
    pub(crate) files: Vec<FileEntry>,
}

impl Directory {
    /// Physical cabinet metadata.
    pub fn details(&self) -> &PartDetails {
        &self.details
    }

    /// Folders in descriptor order.
    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    /// Files in directory order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dos_date_time_unpacks() {
        let entry = FileEntry {
            name: "a".into(),
            length: 0,
            folder_offset: 0,
            attributes: 0,
            // 2019-03-25, from ((2019-1980) << 9) | (3 << 5) | 25
            date: (39 << 9) | (3 << 5) | 25,
            // 16:42:38
            time: (16 << 11) | (42 << 5) | 19,
            folder: 0,
        };
        let stamp = entry.date_time();
        assert_eq!(
            stamp,
            DosDateTime {
                year: 2019,
                month: 3,
                day: 25,
                hour: 16,
                minute: 42,
                second: 38,
            }
        );
    }

    #[test]
    fn attribute_accessors() {
        let entry = FileEntry {
            name: "a".into(),
            length: 0,
            folder_offset: 0,
            attributes: attributes::READ_ONLY | attributes::SYSTEM,
            date: 0,
            time: 0,
            folder: 0,
        };
        assert!(entry.is_read_only());
        assert!(entry.is_system());
        assert!(!entry.is_hidden());
    }
}
