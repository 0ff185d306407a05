//! Help-file header structures and parsing
//!
//! Two fixed headers open every help file: the file header (`ITSF`) with
//! its section table, and the directory header (`ITSP`) describing the
//! chunked directory index. Both magics are fatal on mismatch in every
//! mode.

use binrw::BinRead;
use std::io::{Read, Seek, SeekFrom};

use super::error::{ChmError, ChmResult};
use crate::diag::Warnings;

/// File header magic.
pub const ITSF_SIGNATURE: [u8; 4] = *b"ITSF";
/// Directory header magic.
pub const ITSP_SIGNATURE: [u8; 4] = *b"ITSP";

/// Sentinel chunk number meaning "none".
pub const NO_CHUNK: u32 = 0xFFFF_FFFF;

/// Sanity cap on the directory chunk size.
const MAX_CHUNK_SIZE: u32 = 65536;
/// Sanity cap on the number of directory chunks.
const MAX_CHUNKS: u32 = 0x0010_0000;
/// Sanity cap on the quick-reference density exponent.
const MAX_DENSITY: u32 = 15;

/// Fixed file header fields after the 4-byte signature.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawItsf {
    version: u32,
    header_len: u32,
    _unknown: u32,
    timestamp: u32,
    language_id: u32,
    _guid1: [u8; 16],
    _guid2: [u8; 16],
    _sec0_offset: u64,
    _sec0_length: u64,
    dir_offset: u64,
    dir_length: u64,
}

/// Fixed directory header fields after the 4-byte signature.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawItsp {
    version: u32,
    header_len: u32,
    _unknown1: u32,
    chunk_size: u32,
    density: u32,
    depth: u32,
    root_chunk: u32,
    first_leaf: u32,
    last_leaf: u32,
    _unknown2: u32,
    chunk_count: u32,
    language_id: u32,
    _guid: [u8; 16],
    _header_len2: u32,
    _unknown3: [u32; 3],
}

/// Parsed file header.
#[derive(Debug, Clone)]
pub struct ItsfHeader {
    /// Format version (2 or 3).
    pub version: u32,
    /// Header timestamp, stored as-is.
    pub timestamp: u32,
    /// Windows language identifier.
    pub language_id: u32,
    /// Absolute offset of the directory header.
    pub dir_offset: u64,
    /// Declared length of the whole directory (header plus chunks).
    pub dir_length: u64,
    /// Absolute offset of the content area for section zero.
    ///
    /// A version 3 header stores this; for version 2 it follows directly
    /// after the directory chunks.
    pub content_offset: u64,
}

/// Parsed directory header.
#[derive(Debug, Clone)]
pub struct ItspHeader {
    /// Directory format version.
    pub version: u32,
    /// Size in bytes of one directory chunk.
    pub chunk_size: u32,
    /// Quick-reference density exponent: one quick-ref per
    /// `1 + (1 << density)` entries.
    pub density: u32,
    /// Index tree depth: 1 means no index chunks, 2 means one level.
    pub depth: u32,
    /// Root index chunk number, or [`NO_CHUNK`].
    pub root_chunk: u32,
    /// First leaf chunk in the listing chain.
    pub first_leaf: u32,
    /// Last leaf chunk in the listing chain.
    pub last_leaf: u32,
    /// Total number of directory chunks.
    pub chunk_count: u32,
    /// Windows language identifier.
    pub language_id: u32,
    /// Absolute offset of the first directory chunk.
    pub chunks_offset: u64,
}

fn read_struct<T, R>(source: &mut R, what: &str) -> ChmResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    T::read_le(source).map_err(|e| match e {
        binrw::Error::Io(io) => ChmError::Read(io),
        other => ChmError::DataFormat(format!("{what}: {other}")),
    })
}

/// Read and validate both headers.
pub(crate) fn read_headers<R: Read + Seek>(
    source: &mut R,
    warnings: &mut Warnings,
) -> ChmResult<(ItsfHeader, ItspHeader)> {
    source.seek(SeekFrom::Start(0)).map_err(ChmError::Seek)?;
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic).map_err(ChmError::Read)?;
    if magic != ITSF_SIGNATURE {
        return Err(ChmError::BadSignature(magic));
    }

    let raw: RawItsf = read_struct(source, "file header")?;
    if raw.version != 2 && raw.version != 3 {
        return Err(ChmError::DataFormat(format!(
            "unsupported help-file version {}",
            raw.version
        )));
    }
    let expected_len = if raw.version == 3 { 0x60 } else { 0x58 };
    if raw.header_len != expected_len {
        return Err(ChmError::DataFormat(format!(
            "version {} header declares length 0x{:X}, expected 0x{expected_len:X}",
            raw.version, raw.header_len
        )));
    }
    // Version 3 appends the content offset to the section table.
    let stored_content_offset = if raw.version == 3 {
        Some(read_struct::<u64, _>(source, "content offset")?)
    } else {
        None
    };

    source
        .seek(SeekFrom::Start(raw.dir_offset))
        .map_err(ChmError::Seek)?;
    let mut dir_magic = [0u8; 4];
    source.read_exact(&mut dir_magic).map_err(ChmError::Read)?;
    if dir_magic != ITSP_SIGNATURE {
        return Err(ChmError::BadSignature(dir_magic));
    }
    let dir: RawItsp = read_struct(source, "directory header")?;

    if dir.chunk_size < 32 || dir.chunk_size > MAX_CHUNK_SIZE {
        return Err(ChmError::DataFormat(format!(
            "implausible directory chunk size {}",
            dir.chunk_size
        )));
    }
    if dir.chunk_count == 0 || dir.chunk_count > MAX_CHUNKS {
        return Err(ChmError::DataFormat(format!(
            "implausible directory chunk count {}",
            dir.chunk_count
        )));
    }
    if dir.density > MAX_DENSITY {
        return Err(ChmError::DataFormat(format!(
            "implausible quick-reference density {}",
            dir.density
        )));
    }
    if dir.first_leaf >= dir.chunk_count || dir.last_leaf >= dir.chunk_count {
        return Err(ChmError::DataFormat(
            "leaf chunk chain starts outside the directory".into(),
        ));
    }
    if dir.root_chunk != NO_CHUNK && dir.root_chunk >= dir.chunk_count {
        return Err(ChmError::DataFormat(
            "root index chunk outside the directory".into(),
        ));
    }

    let chunks_offset = raw.dir_offset + u64::from(dir.header_len);
    let chunks_len = u64::from(dir.chunk_size) * u64::from(dir.chunk_count);
    if raw.dir_length != u64::from(dir.header_len) + chunks_len {
        warnings.push(format!(
            "directory length {} disagrees with header {} + chunks {}",
            raw.dir_length, dir.header_len, chunks_len
        ));
    }

    let content_offset = match stored_content_offset {
        Some(offset) => offset,
        None => chunks_offset + chunks_len,
    };

    Ok((
        ItsfHeader {
            version: raw.version,
            timestamp: raw.timestamp,
            language_id: raw.language_id,
            dir_offset: raw.dir_offset,
            dir_length: raw.dir_length,
            content_offset,
        },
        ItspHeader {
            version: dir.version,
            chunk_size: dir.chunk_size,
            density: dir.density,
            depth: dir.depth,
            root_chunk: dir.root_chunk,
            first_leaf: dir.first_leaf,
            last_leaf: dir.last_leaf,
            chunk_count: dir.chunk_count,
            language_id: dir.language_id,
            chunks_offset,
        },
    ))
}
