//! Directory index chunks
//!
//! The help-file directory is an on-disk B-tree of fixed-size chunks. Leaf
//! chunks (`PMGL`) carry name → (section, offset, length) triples; index
//! chunks (`PMGI`) carry name → child-chunk routing entries. Every chunk
//! ends with a quick-reference table: 2-byte offsets to every Nth entry,
//! with the entry count in the final word. Names are sorted, so a lookup
//! binary-searches the quick-refs and then scans at most one group.

use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom};

use super::encint::read_encint;
use super::error::{ChmError, ChmResult};
use super::header::{ItspHeader, NO_CHUNK};

/// Leaf chunk magic.
pub const PMGL_SIGNATURE: [u8; 4] = *b"PMGL";
/// Index chunk magic.
pub const PMGI_SIGNATURE: [u8; 4] = *b"PMGI";

/// Entry area start inside a leaf chunk.
const LEAF_HEADER_LEN: usize = 0x14;
/// Entry area start inside an index chunk.
const INDEX_HEADER_LEN: usize = 0x08;

/// What kind of node a chunk is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkKind {
    /// `PMGL`: name to (section, offset, length).
    Leaf,
    /// `PMGI`: name to child chunk number.
    Index,
}

/// One loaded and validated directory chunk.
#[derive(Debug)]
pub(crate) struct DirChunk {
    pub(crate) kind: ChunkKind,
    /// Raw chunk bytes, `chunk_size` long.
    data: Vec<u8>,
    /// Free space plus quick-reference area at the chunk's end.
    quickref_len: usize,
    /// Next leaf in the listing chain, if any.
    pub(crate) next_leaf: Option<u32>,
    /// Offset where entries begin.
    entries_start: usize,
}

/// A decoded leaf entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChmEntry {
    /// Entry name, as stored (directory names are UTF-8, sorted
    /// case-insensitively).
    pub name: String,
    /// Content section holding the data (0 uncompressed, 1 compressed).
    pub section: u32,
    /// Byte offset within the section's uncompressed stream.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

/// Outcome of searching one chunk.
#[derive(Debug)]
pub(crate) enum ChunkHit {
    /// Exact match in a leaf.
    Entry(ChmEntry),
    /// Index chunk routing toward a child.
    Routing(u32),
    /// Name is not in this subtree.
    Miss,
}

/// Read chunk `number` from `source` and validate its framing.
pub(crate) fn load_chunk<R: Read + Seek>(
    source: &mut R,
    dir: &ItspHeader,
    number: u32,
) -> ChmResult<DirChunk> {
    if number >= dir.chunk_count {
        return Err(ChmError::DataFormat(format!(
            "chunk {number} outside the directory ({} chunks)",
            dir.chunk_count
        )));
    }
    let chunk_size = dir.chunk_size as usize;
    let position = dir.chunks_offset + u64::from(number) * u64::from(dir.chunk_size);
    source
        .seek(SeekFrom::Start(position))
        .map_err(ChmError::Seek)?;
    let mut data = vec![0u8; chunk_size];
    source.read_exact(&mut data).map_err(ChmError::Read)?;

    let magic = [data[0], data[1], data[2], data[3]];
    let kind = match magic {
        PMGL_SIGNATURE => ChunkKind::Leaf,
        PMGI_SIGNATURE => ChunkKind::Index,
        other => return Err(ChmError::BadSignature(other)),
    };
    let quickref_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let entries_start = match kind {
        ChunkKind::Leaf => LEAF_HEADER_LEN,
        ChunkKind::Index => INDEX_HEADER_LEN,
    };
    // The quick-reference area must at least hold the entry-count word and
    // must not reach back into the chunk header.
    if quickref_len < 2 || entries_start + quickref_len > chunk_size {
        return Err(ChmError::DataFormat(format!(
            "chunk {number} quick-reference area overruns the chunk"
        )));
    }
    let next_leaf = match kind {
        ChunkKind::Leaf => {
            let next = u32::from_le_bytes([data[16], data[17], data[18], data[19]]);
            (next != NO_CHUNK).then_some(next)
        }
        ChunkKind::Index => None,
    };

    Ok(DirChunk {
        kind,
        data,
        quickref_len,
        next_leaf,
        entries_start,
    })
}

impl DirChunk {
    /// Number of entries, from the final word of the quick-reference area.
    pub(crate) fn entry_count(&self) -> usize {
        let end = self.data.len();
        usize::from(u16::from_le_bytes([self.data[end - 2], self.data[end - 1]]))
    }

    /// Entry bytes, excluding headers and the quick-reference area.
    fn usable(&self) -> &[u8] {
        &self.data[self.entries_start..self.data.len() - self.quickref_len]
    }

    /// Start offset (within the entry area) of quick-reference group `group`.
    ///
    /// Group 0 starts at offset 0 implicitly; later group offsets are read
    /// from the table growing backwards from the chunk's end.
    fn group_start(&self, group: usize) -> ChmResult<usize> {
        if group == 0 {
            return Ok(0);
        }
        let back = 2 + 2 * group;
        if back > self.quickref_len {
            return Err(ChmError::DataFormat(
                "quick-reference table shorter than its entry count implies".into(),
            ));
        }
        let at = self.data.len() - back;
        let offset = usize::from(u16::from_le_bytes([self.data[at], self.data[at + 1]]));
        if offset >= self.usable().len() {
            return Err(ChmError::DataFormat(
                "quick-reference points outside the entry area".into(),
            ));
        }
        Ok(offset)
    }

    /// Decode the entry at `*offset` in the entry area.
    ///
    /// Returns the raw name bytes and, depending on the chunk kind, either
    /// the content triple or the child chunk number.
    fn read_entry<'a>(&'a self, offset: &mut usize) -> ChmResult<(&'a [u8], EntryBody)> {
        let usable = self.usable();
        let name_len = read_encint(usable, offset)?;
        let name_len = usize::try_from(name_len)
            .ok()
            .filter(|&n| *offset + n <= usable.len())
            .ok_or_else(|| {
                ChmError::DataFormat("entry name overruns the chunk".into())
            })?;
        let name = &usable[*offset..*offset + name_len];
        *offset += name_len;
        let body = match self.kind {
            ChunkKind::Leaf => {
                let section = read_encint(usable, offset)?;
                let data_offset = read_encint(usable, offset)?;
                let length = read_encint(usable, offset)?;
                let section = u32::try_from(section).map_err(|_| {
                    ChmError::DataFormat("entry section number overflows".into())
                })?;
                EntryBody::Content {
                    section,
                    offset: data_offset,
                    length,
                }
            }
            ChunkKind::Index => {
                let child = read_encint(usable, offset)?;
                let child = u32::try_from(child).map_err(|_| {
                    ChmError::DataFormat("child chunk number overflows".into())
                })?;
                EntryBody::Child(child)
            }
        };
        Ok((name, body))
    }

    /// Decode all entries of a leaf chunk, in directory order.
    pub(crate) fn leaf_entries(&self) -> ChmResult<Vec<ChmEntry>> {
        debug_assert_eq!(self.kind, ChunkKind::Leaf);
        let count = self.entry_count();
        let mut offset = 0;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let (name, body) = self.read_entry(&mut offset)?;
            let EntryBody::Content {
                section,
                offset: data_offset,
                length,
            } = body
            else {
                return Err(ChmError::DataFormat("leaf entry without content".into()));
            };
            let name = String::from_utf8(name.to_vec()).map_err(|_| {
                ChmError::DataFormat("entry name is not valid UTF-8".into())
            })?;
            entries.push(ChmEntry {
                name,
                section,
                offset: data_offset,
                length,
            });
        }
        Ok(entries)
    }

    /// Two-phase search: binary search the quick-reference groups, then
    /// scan linearly within the bracketing group.
    pub(crate) fn search(&self, target: &[u8], density: u32) -> ChmResult<ChunkHit> {
        let count = self.entry_count();
        if count == 0 {
            return Ok(ChunkHit::Miss);
        }
        let per_group = 1 + (1usize << density);
        let groups = 1 + (count - 1) / per_group;

        // Find the last group whose first name is not greater than the
        // target.
        let mut low = 0usize;
        let mut high = groups;
        while low < high {
            let mid = low + (high - low) / 2;
            let mut offset = self.group_start(mid)?;
            let (name, _) = self.read_entry(&mut offset)?;
            if compare_names(name, target) == Ordering::Greater {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        if low == 0 {
            // Target sorts before the chunk's first entry.
            return Ok(ChunkHit::Miss);
        }
        let group = low - 1;

        let mut offset = self.group_start(group)?;
        let in_group = per_group.min(count - group * per_group);
        let mut routing = None;
        for _ in 0..in_group {
            let (name, body) = self.read_entry(&mut offset)?;
            match compare_names(name, target) {
                Ordering::Greater => break,
                Ordering::Equal => match body {
                    EntryBody::Content {
                        section,
                        offset: data_offset,
                        length,
                    } => {
                        let name = String::from_utf8(name.to_vec()).map_err(|_| {
                            ChmError::DataFormat("entry name is not valid UTF-8".into())
                        })?;
                        return Ok(ChunkHit::Entry(ChmEntry {
                            name,
                            section,
                            offset: data_offset,
                            length,
                        }));
                    }
                    EntryBody::Child(child) => return Ok(ChunkHit::Routing(child)),
                },
                Ordering::Less => {
                    if let EntryBody::Child(child) = body {
                        routing = Some(child);
                    }
                }
            }
        }

        // Leaves hit only on exact match; index chunks route through the
        // last entry not greater than the target.
        match (self.kind, routing) {
            (ChunkKind::Index, Some(child)) => Ok(ChunkHit::Routing(child)),
            _ => Ok(ChunkHit::Miss),
        }
    }
}

/// Body of a decoded entry.
#[derive(Debug)]
enum EntryBody {
    /// Leaf triple.
    Content {
        section: u32,
        offset: u64,
        length: u64,
    },
    /// Index routing target.
    Child(u32),
}

/// Case-insensitive lexicographic name comparison (ASCII folding).
fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}
