//! Embedded-cabinet signature scanning
//!
//! Byte-wise scans a source for the primary header magic and confirms each
//! candidate by attempting a full header read at that offset. False
//! positives are routine in unstructured data, so the scanner resumes just
//! past the failed 4-byte match rather than at its read cursor; a confirmed
//! cabinet is skipped over wholesale using its self-declared length. The
//! scan consumes the source once and is not restartable.

use std::io::{Read, Seek, SeekFrom};

use super::error::{CabinetError, CabinetResult};
use super::header::read_directory;
use super::model::Directory;
use crate::diag::Warnings;
use crate::options::Options;

/// Lazy iterator over cabinets embedded in a source.
///
/// Yields `(base_offset, directory)` pairs. Extraction from a hit goes
/// through [`super::CabinetSet::open_at`] with the reported offset.
#[derive(Debug)]
pub struct Scan<'a, R> {
    source: &'a mut R,
    options: Options,
    warnings: Warnings,
    file_len: u64,
    buffer: Vec<u8>,
    buf_start: u64,
    buf_len: usize,
    pos: usize,
    /// Signature bytes matched so far (finite-state machine state).
    matched: u8,
    /// Offset of the `M` that began the current candidate match.
    match_start: u64,
    next_read: u64,
    done: bool,
}

/// Begin scanning `source` for embedded cabinets.
pub fn scan<'a, R: Read + Seek>(
    source: &'a mut R,
    options: &Options,
) -> CabinetResult<Scan<'a, R>> {
    let file_len = source
        .seek(SeekFrom::End(0))
        .map_err(CabinetError::Seek)?;
    Ok(Scan {
        source,
        options: options.clone(),
        warnings: Warnings::new(),
        file_len,
        buffer: Vec::new(),
        buf_start: 0,
        buf_len: 0,
        pos: 0,
        matched: 0,
        match_start: 0,
        next_read: 0,
        done: false,
    })
}

impl<R: Read + Seek> Scan<'_, R> {
    /// Warnings recorded while scanning, including confirm-phase warnings.
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    fn refill(&mut self) -> CabinetResult<bool> {
        if self.next_read >= self.file_len {
            return Ok(false);
        }
        let want = self
            .options
            .search_buffer_size
            .max(4)
            .min(usize::try_from(self.file_len - self.next_read).unwrap_or(usize::MAX));
        self.source
            .seek(SeekFrom::Start(self.next_read))
            .map_err(CabinetError::Seek)?;
        self.buffer.resize(want, 0);
        self.source
            .read_exact(&mut self.buffer[..want])
            .map_err(CabinetError::Read)?;
        self.buf_start = self.next_read;
        self.buf_len = want;
        self.pos = 0;
        self.next_read += want as u64;
        Ok(true)
    }

    fn invalidate(&mut self, resume_at: u64) {
        self.buf_len = 0;
        self.pos = 0;
        self.matched = 0;
        self.next_read = resume_at;
    }

    /// A confirm-phase failure that only disqualifies the candidate, as
    /// opposed to a real I/O fault that should end the scan.
    fn is_false_positive(error: &CabinetError) -> bool {
        match error {
            CabinetError::Read(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            CabinetError::Open(_) | CabinetError::Write(_) | CabinetError::Seek(_) => false,
            _ => true,
        }
    }
}

impl<R: Read + Seek> Iterator for Scan<'_, R> {
    type Item = CabinetResult<(u64, Directory)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.pos >= self.buf_len {
                match self.refill() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
            let byte = self.buffer[self.pos];
            self.pos += 1;

            self.matched = match (self.matched, byte) {
                (1, b'S') => 2,
                (2, b'C') => 3,
                (3, b'F') => 4,
                (_, b'M') => {
                    self.match_start = self.buf_start + self.pos as u64 - 1;
                    1
                }
                _ => 0,
            };
            if self.matched < 4 {
                continue;
            }
            self.matched = 0;

            let candidate = self.match_start;
            match read_directory(self.source, candidate, &self.options, &mut self.warnings) {
                Ok(directory) => {
                    let declared = u64::from(directory.details.total_size);
                    if candidate == 0 && declared != self.file_len {
                        self.warnings.push(format!(
                            "cabinet declares {declared} bytes but the file holds {}",
                            self.file_len
                        ));
                    }
                    self.invalidate(candidate + declared.max(4));
                    return Some(Ok((candidate, directory)));
                }
                Err(e) if Self::is_false_positive(&e) => {
                    self.invalidate(candidate + 4);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn noise_yields_nothing_without_error() {
        let mut source = Cursor::new(vec![0x4Du8; 1000]);
        let results: Vec<_> = scan(&mut source, &Options::default())
            .expect("scanner")
            .collect();
        assert!(results.is_empty());
    }

    #[test]
    fn unconfirmed_signature_is_skipped() {
        let mut data = vec![0u8; 64];
        data[10..14].copy_from_slice(b"MSCF");
        let mut source = Cursor::new(data);
        let results: Vec<_> = scan(&mut source, &Options::default())
            .expect("scanner")
            .collect();
        assert!(results.is_empty());
    }

    #[test]
    fn signature_split_across_refills_is_still_seen() {
        // Buffer size 4 forces the magic to straddle a refill boundary; the
        // candidate still fails confirmation but the FSM must reach state 4
        // without panicking or missing data.
        let mut data = vec![0u8; 32];
        data[6..10].copy_from_slice(b"MSCF");
        let mut source = Cursor::new(data);
        let options = Options {
            search_buffer_size: 4,
            ..Options::default()
        };
        let results: Vec<_> = scan(&mut source, &options).expect("scanner").collect();
        assert!(results.is_empty());
    }
}
