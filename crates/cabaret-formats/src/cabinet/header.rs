//! Cabinet header reading and directory linking
//!
//! Parses the fixed primary header, the optional reserve block, the
//! prev/next cabinet labels, the folder descriptors, and the file entries,
//! then links files to folders with the continuation sentinels resolved.
//! Strictness is governed by [`Options::salvage`]: recoverable entry-level
//! problems are dropped with a warning in salvage mode and fatal otherwise.
//! The signature check is fatal in every mode.

use binrw::BinRead;
use std::collections::BTreeSet;
use std::io::{Read, Seek, SeekFrom};

use cabaret_codecs::CompressionMethod;

use super::error::{CabinetError, CabinetResult};
use super::model::{attributes, CabinetLabel, Directory, FileEntry, Folder, PartDetails, SpanPart};
use crate::diag::Warnings;
use crate::options::Options;

/// Primary header magic.
pub const SIGNATURE: [u8; 4] = *b"MSCF";

/// Highest supported format version.
pub const VERSION_MAJOR: u8 = 1;
/// Highest supported minor version under [`VERSION_MAJOR`].
pub const VERSION_MINOR: u8 = 3;

/// Header flag: a previous cabinet label follows the header.
pub const FLAG_PREV_CABINET: u16 = 0x0001;
/// Header flag: a next cabinet label follows the header.
pub const FLAG_NEXT_CABINET: u16 = 0x0002;
/// Header flag: reserve size fields follow the header.
pub const FLAG_RESERVE_PRESENT: u16 = 0x0004;

/// Folder-index sentinel: entry continues from the previous cabinet.
pub const CONTINUED_FROM_PREV: u16 = 0xFFFD;
/// Folder-index sentinel: entry continues into the next cabinet.
pub const CONTINUED_TO_NEXT: u16 = 0xFFFE;
/// Folder-index sentinel: entry spans both neighbours.
pub const CONTINUED_PREV_AND_NEXT: u16 = 0xFFFF;

/// Largest offset or length the format addresses (2 GiB class).
pub const LENGTH_CEILING: u32 = 0x7FFF_8000;

/// Header reserve sizes beyond this draw a warning.
const HEADER_RESERVE_SANITY: u16 = 60000;

/// Longest legal NUL-terminated string in a cabinet header.
const MAX_STRING: usize = 256;

/// Fixed primary header fields after the 4-byte signature.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawPrimaryHeader {
    _reserved1: u32,
    cabinet_size: u32,
    _reserved2: u32,
    files_offset: u32,
    _reserved3: u32,
    version_minor: u8,
    version_major: u8,
    folder_count: u16,
    file_count: u16,
    flags: u16,
    set_id: u16,
    set_index: u16,
}

/// Reserve size fields, present when [`FLAG_RESERVE_PRESENT`] is set.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawReserveSizes {
    header_reserve_size: u16,
    folder_reserve_size: u8,
    data_reserve_size: u8,
}

/// One folder descriptor.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawFolder {
    data_offset: u32,
    block_count: u16,
    compression: u16,
}

/// Fixed part of one file entry, before the name.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawFileFixed {
    length: u32,
    folder_offset: u32,
    folder_index: u16,
    date: u16,
    time: u16,
    attributes: u16,
}

fn read_struct<T, R>(source: &mut R, what: &str) -> CabinetResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    T::read_le(source).map_err(|e| CabinetError::from_binrw(e, what))
}

/// Read a NUL-terminated string's raw bytes, capped at [`MAX_STRING`].
fn read_string_bytes<R: Read>(source: &mut R) -> CabinetResult<Vec<u8>> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte).map_err(CabinetError::Read)?;
        if byte[0] == 0 {
            return Ok(bytes);
        }
        if bytes.len() >= MAX_STRING {
            return Err(CabinetError::DataFormat(
                "unterminated string in cabinet header".into(),
            ));
        }
        bytes.push(byte[0]);
    }
}

/// Decode an entry name: UTF-8 when the attribute bit says so, otherwise a
/// lossless byte-per-character mapping of the OEM code page.
fn decode_name(bytes: &[u8], utf8: bool) -> Option<String> {
    if utf8 {
        String::from_utf8(bytes.to_vec()).ok()
    } else {
        Some(bytes.iter().map(|&b| char::from(b)).collect())
    }
}

fn read_label<R: Read>(source: &mut R) -> CabinetResult<CabinetLabel> {
    let name = read_string_bytes(source)?;
    let disk = read_string_bytes(source)?;
    Ok(CabinetLabel {
        name: name.iter().map(|&b| char::from(b)).collect(),
        disk: disk.iter().map(|&b| char::from(b)).collect(),
    })
}

/// Read and link one cabinet's directory starting at `base_offset`.
pub(crate) fn read_directory<R: Read + Seek>(
    source: &mut R,
    base_offset: u64,
    options: &Options,
    warnings: &mut Warnings,
) -> CabinetResult<Directory> {
    source
        .seek(SeekFrom::Start(base_offset))
        .map_err(CabinetError::Seek)?;

    let mut magic = [0u8; 4];
    source.read_exact(&mut magic).map_err(CabinetError::Read)?;
    if magic != SIGNATURE {
        return Err(CabinetError::BadSignature(magic));
    }

    let raw: RawPrimaryHeader = read_struct(source, "primary header")?;
    if raw.version_major > VERSION_MAJOR
        || (raw.version_major == VERSION_MAJOR && raw.version_minor > VERSION_MINOR)
    {
        return Err(CabinetError::DataFormat(format!(
            "unsupported cabinet version {}.{}",
            raw.version_major, raw.version_minor
        )));
    }
    if raw.folder_count == 0 {
        return Err(CabinetError::DataFormat("cabinet declares no folders".into()));
    }
    if raw.file_count == 0 {
        return Err(CabinetError::DataFormat("cabinet declares no files".into()));
    }

    let (header_reserve_size, folder_reserve_size, data_reserve_size) =
        if raw.flags & FLAG_RESERVE_PRESENT != 0 {
            let sizes: RawReserveSizes = read_struct(source, "reserve sizes")?;
            if sizes.header_reserve_size > HEADER_RESERVE_SANITY {
                warnings.push(format!(
                    "implausible header reserve size {}",
                    sizes.header_reserve_size
                ));
            }
            (
                sizes.header_reserve_size,
                sizes.folder_reserve_size,
                sizes.data_reserve_size,
            )
        } else {
            (0, 0, 0)
        };

    let mut header_reserve = vec![0u8; usize::from(header_reserve_size)];
    if header_reserve_size > 0 {
        source
            .read_exact(&mut header_reserve)
            .map_err(CabinetError::Read)?;
    }

    let prev_cabinet = if raw.flags & FLAG_PREV_CABINET != 0 {
        Some(read_label(source)?)
    } else {
        None
    };
    let next_cabinet = if raw.flags & FLAG_NEXT_CABINET != 0 {
        Some(read_label(source)?)
    } else {
        None
    };

    let mut folders = Vec::with_capacity(usize::from(raw.folder_count));
    for _ in 0..raw.folder_count {
        let descriptor: RawFolder = read_struct(source, "folder descriptor")?;
        let method = CompressionMethod::from_bitfield(descriptor.compression)
            .map_err(|e| CabinetError::DataFormat(e.to_string()))?;
        if folder_reserve_size > 0 {
            source
                .seek(SeekFrom::Current(i64::from(folder_reserve_size)))
                .map_err(CabinetError::Seek)?;
        }
        folders.push(Folder {
            method,
            total_blocks: u32::from(descriptor.block_count),
            spans: vec![SpanPart {
                part: 0,
                data_offset: u64::from(descriptor.data_offset),
                blocks: descriptor.block_count,
            }],
            missing_predecessor: false,
            continued_to_next: Vec::new(),
            continued_from_prev: Vec::new(),
        });
    }

    source
        .seek(SeekFrom::Start(base_offset + u64::from(raw.files_offset)))
        .map_err(CabinetError::Seek)?;

    let last_folder = folders.len() - 1;
    let mut files: Vec<FileEntry> = Vec::with_capacity(usize::from(raw.file_count));
    for ordinal in 0..raw.file_count {
        let fixed: RawFileFixed = read_struct(source, "file entry")?;
        let name_bytes = match read_string_bytes(source) {
            Ok(bytes) => bytes,
            Err(e) if options.salvage => {
                warnings.push(format!(
                    "file entry {ordinal} unreadable ({e}); dropping the rest of the directory"
                ));
                break;
            }
            Err(e) => return Err(e),
        };

        let utf8 = fixed.attributes & attributes::NAME_IS_UTF8 != 0;
        let Some(name) = decode_name(&name_bytes, utf8) else {
            if options.salvage {
                warnings.push(format!("file entry {ordinal} has an undecodable name"));
                continue;
            }
            return Err(CabinetError::DataFormat(format!(
                "file entry {ordinal} has an undecodable name"
            )));
        };

        let index = files.len();
        let folder = match fixed.folder_index {
            CONTINUED_FROM_PREV => {
                folders[0].continued_from_prev.push(index);
                folders[0].missing_predecessor = true;
                0
            }
            CONTINUED_TO_NEXT => {
                folders[last_folder].continued_to_next.push(index);
                last_folder
            }
            CONTINUED_PREV_AND_NEXT => {
                folders[last_folder].continued_to_next.push(index);
                folders[0].continued_from_prev.push(index);
                folders[0].missing_predecessor = true;
                0
            }
            normal => {
                let idx = usize::from(normal);
                if idx >= folders.len() {
                    if options.salvage {
                        warnings.push(format!(
                            "file \"{name}\" references folder {idx} of {}; dropped",
                            folders.len()
                        ));
                        continue;
                    }
                    return Err(CabinetError::DataFormat(format!(
                        "file \"{name}\" references folder {idx} of {}",
                        folders.len()
                    )));
                }
                idx
            }
        };

        files.push(FileEntry {
            name,
            length: fixed.length,
            folder_offset: fixed.folder_offset,
            attributes: fixed.attributes,
            date: fixed.date,
            time: fixed.time,
            folder,
        });
    }

    enforce_capacity(&mut folders, &mut files, options, warnings)?;

    if files.is_empty() {
        return Err(CabinetError::DataFormat(
            "no resolvable files in cabinet directory".into(),
        ));
    }

    Ok(Directory {
        details: PartDetails {
            base_offset,
            total_size: raw.cabinet_size,
            set_id: raw.set_id,
            set_index: raw.set_index,
            data_reserve_size,
            header_reserve,
            prev_cabinet,
            next_cabinet,
        },
        folders,
        files,
    })
}

/// Drop (salvage) or reject (strict) entries that overrun their folder's
/// uncompressed capacity. Folders that continue into a neighbouring cabinet
/// are exempt: their capacity is only known after merging.
fn enforce_capacity(
    folders: &mut [Folder],
    files: &mut Vec<FileEntry>,
    options: &Options,
    warnings: &mut Warnings,
) -> CabinetResult<()> {
    let mut dropped = BTreeSet::new();
    for (index, file) in files.iter().enumerate() {
        let folder = &folders[file.folder];
        if !folder.continued_to_next.is_empty() || folder.missing_predecessor {
            continue;
        }
        let end = u64::from(file.folder_offset) + u64::from(file.length);
        if end > folder.capacity() {
            if !options.salvage {
                return Err(CabinetError::DataFormat(format!(
                    "file \"{}\" overruns its folder: ends at {end}, capacity {}",
                    file.name,
                    folder.capacity()
                )));
            }
            warnings.push(format!(
                "file \"{}\" overruns its folder; dropped",
                file.name
            ));
            dropped.insert(index);
        }
    }
    if dropped.is_empty() {
        return Ok(());
    }

    // Rebuild the arena without the dropped entries and remap anchors.
    let mut remap = vec![usize::MAX; files.len()];
    let mut kept = Vec::with_capacity(files.len() - dropped.len());
    for (index, file) in files.drain(..).enumerate() {
        if !dropped.contains(&index) {
            remap[index] = kept.len();
            kept.push(file);
        }
    }
    *files = kept;
    for folder in folders.iter_mut() {
        folder
            .continued_to_next
            .retain_mut(|i| match remap[*i] {
                usize::MAX => false,
                new => {
                    *i = new;
                    true
                }
            });
        folder
            .continued_from_prev
            .retain_mut(|i| match remap[*i] {
                usize::MAX => false,
                new => {
                    *i = new;
                    true
                }
            });
    }
    Ok(())
}
