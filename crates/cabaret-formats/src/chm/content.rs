//! Content section resolution and extraction
//!
//! Entries live in one of two content sections. Section 0 is stored
//! verbatim after the directory; extraction is a bounded copy. Section 1
//! is one LZX stream restartable at fixed reset intervals, described by
//! three special section-0 entries: the compressed content itself, the
//! `LZXC` control data (window and reset interval), and the reset table
//! mapping frame numbers to compressed offsets. Extraction locates the
//! reset point at or before the requested range and decodes forward
//! through the codec seam.

use std::io::{Read, Seek, SeekFrom, Write};

use cabaret_codecs::{BlockDecoder, CompressionMethod};

use super::chunk::ChmEntry;
use super::error::{ChmError, ChmResult};
use super::HelpFile;

/// Section number of the uncompressed content area.
pub const SECTION_UNCOMPRESSED: u32 = 0;
/// Section number of the LZX-compressed content area.
pub const SECTION_COMPRESSED: u32 = 1;

const CONTENT_NAME: &str = "::DataSpace/Storage/MSCompressed/Content";
const CONTROL_NAME: &str = "::DataSpace/Storage/MSCompressed/ControlData";
const RESET_TABLE_NAME: &str = "::DataSpace/Storage/MSCompressed/Transform/\
{7FC28940-9D31-11D0-9B27-00A0C91E9C7C}/InstanceData/ResetTable";

const LZXC_SIGNATURE: [u8; 4] = *b"LZXC";
/// Uncompressed bytes per LZX frame.
const FRAME_SIZE: u64 = 0x8000;
/// Cap on section metadata reads; the control data and reset table of any
/// plausible help file are far smaller.
const MAX_META: u64 = 1 << 24;

/// Resolved description of the compressed section.
#[derive(Debug)]
pub(crate) struct CompressedSection {
    /// Absolute offset of the compressed stream.
    content_offset: u64,
    /// Stored length of the compressed stream entry.
    content_length: u64,
    window_bits: u8,
    /// Frames between decoder reset points.
    reset_interval_frames: u64,
    uncompressed_len: u64,
    compressed_len: u64,
    /// Compressed-stream offset of each frame's first byte.
    reset_offsets: Vec<u64>,
}

impl<R: Read + Seek> HelpFile<R> {
    /// Extract one entry to `sink`.
    pub fn extract<W: Write>(&mut self, entry: &ChmEntry, sink: &mut W) -> ChmResult<()> {
        match entry.section {
            SECTION_UNCOMPRESSED => self.copy_uncompressed(entry.offset, entry.length, sink),
            SECTION_COMPRESSED => self.extract_compressed(entry, sink),
            other => Err(ChmError::DataFormat(format!(
                "entry \"{}\" is in unknown section {other}",
                entry.name
            ))),
        }
    }

    /// Bounded copy out of the uncompressed content area.
    fn copy_uncompressed<W: Write>(
        &mut self,
        offset: u64,
        length: u64,
        sink: &mut W,
    ) -> ChmResult<()> {
        self.source
            .seek(SeekFrom::Start(self.itsf.content_offset + offset))
            .map_err(ChmError::Seek)?;
        let mut buffer = vec![0u8; self.options.input_buffer_size.max(512)];
        let mut remaining = length;
        while remaining > 0 {
            let take = buffer
                .len()
                .min(usize::try_from(remaining).unwrap_or(usize::MAX));
            self.source
                .read_exact(&mut buffer[..take])
                .map_err(ChmError::Read)?;
            sink.write_all(&buffer[..take]).map_err(ChmError::Write)?;
            remaining -= take as u64;
        }
        Ok(())
    }

    /// Read one of the special section-0 metadata entries.
    fn read_meta(&mut self, name: &str, what: &str) -> ChmResult<Vec<u8>> {
        let Some(entry) = self.fast_find(name)? else {
            return Err(ChmError::Decrunch(format!(
                "compressed section is missing its {what}"
            )));
        };
        if entry.section != SECTION_UNCOMPRESSED {
            return Err(ChmError::DataFormat(format!(
                "{what} entry is not in the uncompressed section"
            )));
        }
        if entry.length > MAX_META {
            return Err(ChmError::DataFormat(format!(
                "{what} entry is implausibly large ({} bytes)",
                entry.length
            )));
        }
        let mut data = Vec::with_capacity(entry.length as usize);
        self.copy_uncompressed(entry.offset, entry.length, &mut data)?;
        Ok(data)
    }

    fn extract_compressed<W: Write>(&mut self, entry: &ChmEntry, sink: &mut W) -> ChmResult<()> {
        if self.compressed.is_none() {
            let resolved = self.resolve_compressed()?;
            self.compressed = Some(resolved);
        }
        let Some(section) = self.compressed.take() else {
            return Err(ChmError::InvalidArgs("compressed section unresolved".into()));
        };
        let result = self.decode_compressed(&section, entry, sink);
        self.compressed = Some(section);
        result
    }

    fn resolve_compressed(&mut self) -> ChmResult<CompressedSection> {
        let Some(content) = self.fast_find(CONTENT_NAME)? else {
            return Err(ChmError::Decrunch(
                "compressed section is missing its content entry".into(),
            ));
        };
        if content.section != SECTION_UNCOMPRESSED {
            return Err(ChmError::DataFormat(
                "compressed content entry is not in the uncompressed section".into(),
            ));
        }

        let control = self.read_meta(CONTROL_NAME, "control data")?;
        if control.len() < 0x18 {
            return Err(ChmError::DataFormat("control data truncated".into()));
        }
        let magic = [control[4], control[5], control[6], control[7]];
        if magic != LZXC_SIGNATURE {
            return Err(ChmError::BadSignature(magic));
        }
        let version = u32::from_le_bytes([control[8], control[9], control[10], control[11]]);
        let raw_interval =
            u64::from(u32::from_le_bytes([control[12], control[13], control[14], control[15]]));
        let raw_window =
            u64::from(u32::from_le_bytes([control[16], control[17], control[18], control[19]]));
        // Version 2 stores both values in frames rather than bytes.
        let (interval, window) = match version {
            1 => (raw_interval, raw_window),
            2 => (raw_interval * FRAME_SIZE, raw_window * FRAME_SIZE),
            other => {
                return Err(ChmError::DataFormat(format!(
                    "unsupported LZXC control data version {other}"
                )));
            }
        };
        if interval == 0 || interval % FRAME_SIZE != 0 {
            return Err(ChmError::DataFormat(format!(
                "reset interval {interval} is not a whole number of frames"
            )));
        }
        let window_bits = window.trailing_zeros() as u8;
        if window == 0 || 1u64 << window_bits != window || !(15..=21).contains(&window_bits) {
            return Err(ChmError::DataFormat(format!(
                "implausible LZX window size {window}"
            )));
        }

        let table = self.read_meta(RESET_TABLE_NAME, "reset table")?;
        if table.len() < 0x28 {
            return Err(ChmError::DataFormat("reset table truncated".into()));
        }
        let entry_count = u32::from_le_bytes([table[4], table[5], table[6], table[7]]);
        let entry_size = u32::from_le_bytes([table[8], table[9], table[10], table[11]]);
        let header_size = u32::from_le_bytes([table[12], table[13], table[14], table[15]]);
        let read_u64 = |at: usize| {
            u64::from_le_bytes([
                table[at],
                table[at + 1],
                table[at + 2],
                table[at + 3],
                table[at + 4],
                table[at + 5],
                table[at + 6],
                table[at + 7],
            ])
        };
        let uncompressed_len = read_u64(0x10);
        let compressed_len = read_u64(0x18);
        let frame_size = read_u64(0x20);
        if entry_size != 8 || frame_size != FRAME_SIZE {
            return Err(ChmError::DataFormat(
                "reset table does not use 8-byte entries over 32 KiB frames".into(),
            ));
        }
        let entries_start = header_size as usize;
        let need = entries_start + entry_count as usize * 8;
        if need > table.len() {
            return Err(ChmError::DataFormat(
                "reset table shorter than its entry count implies".into(),
            ));
        }
        let mut reset_offsets = Vec::with_capacity(entry_count as usize);
        for index in 0..entry_count as usize {
            reset_offsets.push(read_u64(entries_start + index * 8));
        }

        if compressed_len > content.length {
            self.warnings.push(format!(
                "reset table declares {compressed_len} compressed bytes but the \
                 content entry holds {}",
                content.length
            ));
        }

        Ok(CompressedSection {
            content_offset: self.itsf.content_offset + content.offset,
            content_length: content.length,
            window_bits,
            reset_interval_frames: interval / FRAME_SIZE,
            uncompressed_len,
            compressed_len,
            reset_offsets,
        })
    }

    /// Forward-only decode from the nearest reset point through the
    /// requested range.
    fn decode_compressed<W: Write>(
        &mut self,
        section: &CompressedSection,
        entry: &ChmEntry,
        sink: &mut W,
    ) -> ChmResult<()> {
        let end = entry.offset + entry.length;
        if end > section.uncompressed_len {
            return Err(ChmError::DataFormat(format!(
                "entry \"{}\" overruns the compressed section",
                entry.name
            )));
        }
        if entry.length == 0 {
            return Ok(());
        }

        let first_frame = entry.offset / FRAME_SIZE;
        let start_frame = first_frame - (first_frame % section.reset_interval_frames);
        let total_frames = section.reset_offsets.len() as u64;

        let mut decoder = BlockDecoder::new(CompressionMethod::Lzx {
            window: section.window_bits,
        })?;
        decoder.set_output_length(section.uncompressed_len);

        let mut position = start_frame * FRAME_SIZE;
        let mut pending = Vec::new();
        let mut frame = start_frame;
        while position < end {
            if frame >= total_frames {
                return Err(ChmError::DataFormat(
                    "reset table ends before the requested data".into(),
                ));
            }
            let comp_start = section.reset_offsets[frame as usize];
            let comp_end = if frame + 1 < total_frames {
                section.reset_offsets[frame as usize + 1]
            } else {
                section.compressed_len
            };
            if comp_end < comp_start
                || comp_end > section.compressed_len
                || comp_end > section.content_length
            {
                return Err(ChmError::DataFormat(format!(
                    "reset table frame {frame} is out of order"
                )));
            }

            self.source
                .seek(SeekFrom::Start(section.content_offset + comp_start))
                .map_err(ChmError::Seek)?;
            let mut compressed = vec![0u8; (comp_end - comp_start) as usize];
            self.source
                .read_exact(&mut compressed)
                .map_err(ChmError::Read)?;

            let uncompressed =
                FRAME_SIZE.min(section.uncompressed_len - frame * FRAME_SIZE) as usize;
            decoder.decode_block(&compressed, uncompressed, &mut pending)?;
            frame += 1;

            let block_start = position;
            let block_end = position + pending.len() as u64;
            let deliver_from = entry.offset.max(block_start);
            let deliver_to = end.min(block_end);
            if deliver_to > deliver_from {
                let a = (deliver_from - block_start) as usize;
                let b = (deliver_to - block_start) as usize;
                sink.write_all(&pending[a..b]).map_err(ChmError::Write)?;
            }
            position = block_end;
            pending.clear();
        }
        Ok(())
    }
}
