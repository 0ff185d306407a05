//! Compressed help-file containers
//!
//! A help file is a single-part container with a chunked on-disk directory
//! index. Lookups do not require parsing the whole directory:
//! [`HelpFile::fast_find`] walks the index chunks (binary search over each
//! chunk's quick-reference table, then a short linear scan) straight to the
//! entry. [`HelpFile::open`] additionally decodes the full listing;
//! [`HelpFile::fast_open`] reads only the two headers.
//!
//! Content lives in two sections: section 0 is stored verbatim, section 1
//! is one LZX stream restartable at fixed reset intervals and is decoded
//! through the [`cabaret_codecs`] seam.

mod chunk;
mod content;
mod encint;
mod error;
mod header;
mod search;

pub use chunk::{ChmEntry, PMGI_SIGNATURE, PMGL_SIGNATURE};
pub use content::{SECTION_COMPRESSED, SECTION_UNCOMPRESSED};
pub use error::{ChmError, ChmResult};
pub use header::{ItsfHeader, ItspHeader, ITSF_SIGNATURE, ITSP_SIGNATURE, NO_CHUNK};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::diag::Warnings;
use crate::options::Options;
use chunk::DirChunk;
use content::CompressedSection;

/// One opened help file.
///
/// Holds the parsed headers, the per-handle directory chunk cache (filled
/// lazily, alive for the handle's lifetime), and the listing when the file
/// was opened with [`HelpFile::open`]. Handles are independent; nothing is
/// shared between two open help files.
#[derive(Debug)]
pub struct HelpFile<R> {
    pub(crate) source: R,
    pub(crate) itsf: ItsfHeader,
    pub(crate) itsp: ItspHeader,
    entries: Vec<ChmEntry>,
    pub(crate) chunk_cache: HashMap<u32, DirChunk>,
    pub(crate) compressed: Option<CompressedSection>,
    pub(crate) options: Options,
    pub(crate) warnings: Warnings,
}

impl<R: Read + Seek> HelpFile<R> {
    /// Open a help file and decode its complete listing.
    pub fn open(source: R, options: Options) -> ChmResult<Self> {
        let mut this = Self::fast_open(source, options)?;
        let entries = this.walk_directory()?;
        if entries.is_empty() {
            return Err(ChmError::DataFormat(
                "no resolvable entries in help-file directory".into(),
            ));
        }
        this.entries = entries;
        Ok(this)
    }

    /// Open a help file reading only its headers.
    ///
    /// The listing stays empty; [`HelpFile::fast_find`] resolves names
    /// against the on-disk index instead.
    pub fn fast_open(mut source: R, options: Options) -> ChmResult<Self> {
        let mut warnings = Warnings::new();
        let (itsf, itsp) = header::read_headers(&mut source, &mut warnings)?;
        Ok(Self {
            source,
            itsf,
            itsp,
            entries: Vec::new(),
            chunk_cache: HashMap::new(),
            compressed: None,
            options,
            warnings,
        })
    }

    /// The parsed file header.
    pub fn file_header(&self) -> &ItsfHeader {
        &self.itsf
    }

    /// The parsed directory header.
    pub fn directory_header(&self) -> &ItspHeader {
        &self.itsp
    }

    /// The decoded listing; empty for fast-opened files.
    pub fn entries(&self) -> &[ChmEntry] {
        &self.entries
    }

    /// Find an entry in the decoded listing by case-insensitive name.
    pub fn find(&self, name: &str) -> Option<&ChmEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    /// Look up a name and extract the entry in one step.
    pub fn extract_named<W: Write>(&mut self, name: &str, sink: &mut W) -> ChmResult<bool> {
        match self.fast_find(name)? {
            Some(entry) => {
                self.extract(&entry, sink)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Extract one entry to a filesystem path.
    ///
    /// The destination is created before extraction begins, so a failed
    /// extraction leaves a partial file behind.
    pub fn extract_to_path<P: AsRef<Path>>(
        &mut self,
        entry: &ChmEntry,
        path: P,
    ) -> ChmResult<()> {
        let file = File::create(path).map_err(ChmError::Open)?;
        let mut sink = BufWriter::new(file);
        self.extract(entry, &mut sink)?;
        sink.flush().map_err(ChmError::Write)?;
        Ok(())
    }
}

impl HelpFile<File> {
    /// Open a help file from the filesystem with its complete listing.
    pub fn open_path<P: AsRef<Path>>(path: P, options: Options) -> ChmResult<Self> {
        let file = File::open(path).map_err(ChmError::Open)?;
        Self::open(file, options)
    }

    /// Open a help file from the filesystem, headers only.
    pub fn fast_open_path<P: AsRef<Path>>(path: P, options: Options) -> ChmResult<Self> {
        let file = File::open(path).map_err(ChmError::Open)?;
        Self::fast_open(file, options)
    }
}
