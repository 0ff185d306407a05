//! Streaming block decompression
//!
//! One extraction cursor lives per cabinet set. The cursor is strictly
//! forward-only: requesting an offset behind its current position tears it
//! down and restarts decompression from the folder's first block, because
//! the underlying block codecs cannot seek. Cursor states are
//! Uninitialized (`None`), Active (this struct), and torn down again on
//! rewind or folder switch.

use std::io::{Read, Seek, SeekFrom, Write};

use cabaret_codecs::BlockDecoder;

use super::checksum::block_checksum;
use super::error::{CabinetError, CabinetResult};
use super::header::LENGTH_CEILING;
use super::model::{FileEntry, Folder};
use super::Part;
use crate::diag::Warnings;
use crate::options::Options;

/// Largest uncompressed payload of one block.
pub(crate) const BLOCK_UNCOMPRESSED_MAX: usize = 32768;
/// Largest compressed payload of one block (codec worst case plus slack).
pub(crate) const BLOCK_COMPRESSED_MAX: usize = BLOCK_UNCOMPRESSED_MAX + 6144;
/// Absolute per-field ceiling applied to both sizes in salvage mode.
pub(crate) const BLOCK_SALVAGE_MAX: usize = 65535;

/// Active decompression cursor over one folder.
#[derive(Debug)]
pub(crate) struct ExtractState {
    /// Arena index of the folder being decompressed.
    pub(crate) folder: usize,
    /// Uncompressed offset of the next undelivered byte.
    position: u64,
    /// Decoded bytes not yet delivered, starting at `position`.
    pending: Vec<u8>,
    /// Physical blocks consumed so far, across all span parts.
    blocks_read: u32,
    /// Current span part and intra-span block progress.
    span: usize,
    span_blocks_read: u16,
    /// Absolute offset of the next block header in the current part.
    read_offset: u64,
    decoder: BlockDecoder,
}

impl ExtractState {
    fn new<R>(folder_index: usize, folder: &Folder, parts: &[Part<R>]) -> CabinetResult<Self> {
        let decoder = BlockDecoder::new(folder.method)?;
        let span = &folder.spans[0];
        Ok(Self {
            folder: folder_index,
            position: 0,
            pending: Vec::new(),
            blocks_read: 0,
            span: 0,
            span_blocks_read: 0,
            read_offset: parts[span.part].details.base_offset + span.data_offset,
            decoder,
        })
    }
}

/// Extract one file to `sink`, reusing or rebuilding the cursor as needed.
pub(crate) fn extract_file<R: Read + Seek, W: Write>(
    parts: &mut [Part<R>],
    folders: &[Folder],
    state_slot: &mut Option<ExtractState>,
    options: &Options,
    warnings: &mut Warnings,
    file: &FileEntry,
    sink: &mut W,
) -> CabinetResult<()> {
    let folder = &folders[file.folder];
    if folder.missing_predecessor {
        return Err(CabinetError::Decrunch(format!(
            "file \"{}\" is continued from a cabinet that is not loaded",
            file.name
        )));
    }

    let target_start = u64::from(file.folder_offset);
    let mut target_len = u64::from(file.length);
    if file.folder_offset > LENGTH_CEILING || file.length > LENGTH_CEILING {
        if !options.salvage {
            return Err(CabinetError::DataFormat(format!(
                "file \"{}\" exceeds the format's size ceiling",
                file.name
            )));
        }
        let ceiling = u64::from(LENGTH_CEILING);
        target_len = ceiling.saturating_sub(target_start).min(target_len);
        warnings.push(format!(
            "file \"{}\" exceeds the size ceiling; clamped to {target_len} bytes",
            file.name
        ));
    }

    let reuse = matches!(
        state_slot,
        Some(state) if state.folder == file.folder && state.position <= target_start
    );
    if !reuse {
        *state_slot = Some(ExtractState::new(file.folder, folder, parts)?);
    }
    let Some(state) = state_slot.as_mut() else {
        return Err(CabinetError::InvalidArgs("cursor initialization failed".into()));
    };

    // Seek forward, discarding decoded output up to the file's start.
    while state.position < target_start {
        if state.pending.is_empty() && !fill_block(parts, folder, state, options, warnings)? {
            return exhausted(options, warnings, file, "before its data begins");
        }
        let drop = state
            .pending
            .len()
            .min(usize::try_from(target_start - state.position).unwrap_or(usize::MAX));
        state.pending.drain(..drop);
        state.position += drop as u64;
    }

    // Deliver the file's bytes.
    let mut remaining = target_len;
    while remaining > 0 {
        if state.pending.is_empty() && !fill_block(parts, folder, state, options, warnings)? {
            return exhausted(options, warnings, file, "mid-file");
        }
        let take = state
            .pending
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        sink.write_all(&state.pending[..take])
            .map_err(CabinetError::Write)?;
        state.pending.drain(..take);
        state.position += take as u64;
        remaining -= take as u64;
    }
    Ok(())
}

/// The folder ran out of blocks: fatal in strict mode, a warned truncation
/// in salvage mode.
fn exhausted(
    options: &Options,
    warnings: &mut Warnings,
    file: &FileEntry,
    when: &str,
) -> CabinetResult<()> {
    if options.salvage {
        warnings.push(format!(
            "folder ran out of blocks {when} while extracting \"{}\"; output truncated",
            file.name
        ));
        return Ok(());
    }
    Err(CabinetError::DataFormat(format!(
        "folder ran out of blocks {when} while extracting \"{}\"",
        file.name
    )))
}

/// Read and decode the next logical block into the cursor's pending buffer.
///
/// Joins split-block fragments across span parts. Returns `Ok(false)` when
/// the folder's declared blocks are exhausted, or when salvage mode
/// downgrades a structural dead end.
fn fill_block<R: Read + Seek>(
    parts: &mut [Part<R>],
    folder: &Folder,
    state: &mut ExtractState,
    options: &Options,
    warnings: &mut Warnings,
) -> CabinetResult<bool> {
    if state.blocks_read >= folder.total_blocks {
        return Ok(false);
    }

    let mut payload: Vec<u8> = Vec::with_capacity(options.input_buffer_size);
    let uncompressed_len;
    loop {
        // A span whose block budget is consumed hands over to the next part.
        while state.span_blocks_read >= folder.spans[state.span].blocks {
            if !advance_span(folder, state, parts, options, warnings)? {
                return Ok(false);
            }
        }

        let span = &folder.spans[state.span];
        let part = &mut parts[span.part];
        part.source
            .seek(SeekFrom::Start(state.read_offset))
            .map_err(CabinetError::Seek)?;
        let mut header = [0u8; 8];
        part.source
            .read_exact(&mut header)
            .map_err(CabinetError::Read)?;
        let stored = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let compressed = usize::from(u16::from_le_bytes([header[4], header[5]]));
        let uncompressed = usize::from(u16::from_le_bytes([header[6], header[7]]));

        let (compressed_max, uncompressed_max) = if options.salvage {
            (BLOCK_SALVAGE_MAX, BLOCK_SALVAGE_MAX)
        } else {
            (BLOCK_COMPRESSED_MAX, BLOCK_UNCOMPRESSED_MAX)
        };
        if compressed > compressed_max {
            return Err(CabinetError::DataFormat(format!(
                "block {} declares {compressed} compressed bytes (limit {compressed_max})",
                state.blocks_read
            )));
        }
        if uncompressed > uncompressed_max {
            return Err(CabinetError::DataFormat(format!(
                "block {} declares {uncompressed} uncompressed bytes (limit {uncompressed_max})",
                state.blocks_read
            )));
        }

        let reserve = part.details.data_reserve_size;
        if reserve > 0 {
            part.source
                .seek(SeekFrom::Current(i64::from(reserve)))
                .map_err(CabinetError::Seek)?;
        }
        let mut data = vec![0u8; compressed];
        part.source
            .read_exact(&mut data)
            .map_err(CabinetError::Read)?;
        state.read_offset += 8 + u64::from(reserve) + compressed as u64;
        state.span_blocks_read += 1;
        state.blocks_read += 1;

        // A zero stored checksum means "not checksummed".
        if stored != 0 {
            let got = block_checksum([header[4], header[5], header[6], header[7]], &data);
            if got != stored {
                if options.salvage || options.tolerate_bad_checksums {
                    warnings.push(format!(
                        "block {} checksum mismatch: expected {stored:08X}, got {got:08X}",
                        state.blocks_read - 1
                    ));
                } else {
                    return Err(CabinetError::Checksum {
                        block: state.blocks_read - 1,
                        expected: stored,
                        got,
                    });
                }
            }
        }

        payload.extend_from_slice(&data);

        // Uncompressed size zero marks a fragment whose remainder lives in
        // the next physical part.
        if uncompressed == 0 {
            if !advance_span(folder, state, parts, options, warnings)? {
                return Ok(false);
            }
            continue;
        }
        uncompressed_len = uncompressed;
        break;
    }

    // The LZX framing needs the exact stream length before the final block.
    if state.blocks_read == folder.total_blocks {
        let total = state.position + state.pending.len() as u64 + uncompressed_len as u64;
        state.decoder.set_output_length(total);
    }

    state
        .decoder
        .decode_block(&payload, uncompressed_len, &mut state.pending)?;
    Ok(true)
}

/// Move the cursor to the next span part, or report the dead end.
fn advance_span<R>(
    folder: &Folder,
    state: &mut ExtractState,
    parts: &[Part<R>],
    options: &Options,
    warnings: &mut Warnings,
) -> CabinetResult<bool> {
    if state.span + 1 >= folder.spans.len() {
        if options.salvage {
            warnings.push(
                "folder data continues in a cabinet that is not loaded; output truncated".into(),
            );
            return Ok(false);
        }
        return Err(CabinetError::DataFormat(
            "folder data continues in a cabinet that is not loaded".into(),
        ));
    }
    state.span += 1;
    state.span_blocks_read = 0;
    let span = &folder.spans[state.span];
    state.read_offset = parts[span.part].details.base_offset + span.data_offset;
    Ok(true)
}
