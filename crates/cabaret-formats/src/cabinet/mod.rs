//! Cabinet archive directory engine and extractor
//!
//! A cabinet stores its files inside compressed *folders*; a folder's block
//! stream may span several physical cabinet files of one multi-part set.
//! This module parses and links the on-disk directory, merges adjacent
//! parts into one logical view, and extracts files through a forward-only
//! block decompression cursor.
//!
//! # Usage
//!
//! ```no_run
//! use cabaret_formats::cabinet::CabinetSet;
//! use cabaret_formats::Options;
//!
//! let mut set = CabinetSet::open_path("setup.cab", Options::default())?;
//! if let Some(index) = set.find("readme.txt") {
//!     let mut out = Vec::new();
//!     set.extract(index, &mut out)?;
//! }
//! # Ok::<(), cabaret_formats::cabinet::CabinetError>(())
//! ```
//!
//! Multi-part sets are assembled with [`CabinetSet::append`] and
//! [`CabinetSet::prepend`]; files whose folder spans the part boundary only
//! become extractable once the neighbouring part is merged in. Cabinets
//! embedded in arbitrary data are located with [`scan`].

mod checksum;
mod error;
mod extract;
mod header;
mod merge;
mod model;
mod scan;

pub use error::{CabinetError, CabinetResult};
pub use header::{
    CONTINUED_FROM_PREV, CONTINUED_PREV_AND_NEXT, CONTINUED_TO_NEXT, FLAG_NEXT_CABINET,
    FLAG_PREV_CABINET, FLAG_RESERVE_PRESENT, LENGTH_CEILING, SIGNATURE,
};
pub use model::{
    attributes, CabinetLabel, Directory, DosDateTime, FileEntry, Folder, PartDetails, SpanPart,
};
pub use scan::{scan, Scan};

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::diag::Warnings;
use crate::options::Options;
use extract::ExtractState;

/// One physical cabinet within a set: its source and parsed metadata.
#[derive(Debug)]
pub(crate) struct Part<R> {
    pub(crate) source: R,
    pub(crate) details: PartDetails,
}

/// A single opened cabinet file.
///
/// Parsing happens entirely at open time; the value holds the linked
/// directory and the source for later extraction. Fold it into a
/// [`CabinetSet`] to extract or merge.
#[derive(Debug)]
pub struct Cabinet<R> {
    source: R,
    directory: Directory,
    warnings: Warnings,
}

impl<R: Read + Seek> Cabinet<R> {
    /// Open a cabinet at the start of `source` with default options.
    pub fn open(source: R) -> CabinetResult<Self> {
        Self::open_at(source, 0, &Options::default())
    }

    /// Open a cabinet at the start of `source`.
    pub fn open_with(source: R, options: &Options) -> CabinetResult<Self> {
        Self::open_at(source, 0, options)
    }

    /// Open a cabinet embedded at `base_offset` within `source`.
    ///
    /// All offsets in the cabinet are interpreted relative to
    /// `base_offset`, which is how hits reported by [`scan`] are opened.
    pub fn open_at(mut source: R, base_offset: u64, options: &Options) -> CabinetResult<Self> {
        let mut warnings = Warnings::new();
        let directory = header::read_directory(&mut source, base_offset, options, &mut warnings)?;
        Ok(Self {
            source,
            directory,
            warnings,
        })
    }

    /// The parsed directory.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Warnings recorded while parsing.
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }
}

impl Cabinet<File> {
    /// Open a cabinet file from the filesystem with default options.
    pub fn open_path<P: AsRef<Path>>(path: P) -> CabinetResult<Self> {
        let file = File::open(path).map_err(CabinetError::Open)?;
        Self::open(file)
    }
}

/// The logical view of one cabinet set: one or more physical parts sharing
/// a single folder and file arena.
///
/// Every part of a merged set observes the identical directory; folder and
/// file handles are indices into the shared arenas and stay valid across
/// merges. At most one extraction cursor is live per set, and it only
/// moves forward; see [`CabinetSet::extract`].
#[derive(Debug)]
pub struct CabinetSet<R> {
    pub(crate) parts: Vec<Part<R>>,
    pub(crate) folders: Vec<Folder>,
    pub(crate) files: Vec<FileEntry>,
    pub(crate) state: Option<ExtractState>,
    pub(crate) options: Options,
    pub(crate) warnings: Warnings,
}

impl<R: Read + Seek> CabinetSet<R> {
    /// Wrap a single opened cabinet as a one-part set.
    pub fn new(cabinet: Cabinet<R>, options: Options) -> Self {
        let Cabinet {
            source,
            directory,
            warnings,
        } = cabinet;
        Self {
            parts: vec![Part {
                source,
                details: directory.details,
            }],
            folders: directory.folders,
            files: directory.files,
            state: None,
            options,
            warnings,
        }
    }

    /// Open a cabinet at the start of `source` and wrap it as a set.
    pub fn open(source: R, options: Options) -> CabinetResult<Self> {
        let cabinet = Cabinet::open_with(source, &options)?;
        Ok(Self::new(cabinet, options))
    }

    /// Open a cabinet embedded at `base_offset` and wrap it as a set.
    pub fn open_at(source: R, base_offset: u64, options: Options) -> CabinetResult<Self> {
        let cabinet = Cabinet::open_at(source, base_offset, &options)?;
        Ok(Self::new(cabinet, options))
    }

    /// Files of the whole set, in directory order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Folders of the whole set.
    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    /// Number of physical parts merged into this set.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Metadata of one physical part.
    pub fn part_details(&self, part: usize) -> Option<&PartDetails> {
        self.parts.get(part).map(|p| &p.details)
    }

    /// Current engine options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replace the engine options for subsequent operations.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    /// Warnings recorded by parsing, merging and extraction so far.
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    /// Find a file by exact name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|f| f.name == name)
    }

    /// Extract one file to `sink`.
    ///
    /// The cursor is reused when the request lies at or ahead of its
    /// current position in the same folder; any other request tears it
    /// down and decompression restarts from the folder's first block.
    /// On error the sink may have received a partial prefix of the file.
    pub fn extract<W: Write>(&mut self, file_index: usize, sink: &mut W) -> CabinetResult<()> {
        let Some(file) = self.files.get(file_index).cloned() else {
            return Err(CabinetError::InvalidArgs(format!(
                "file index {file_index} out of range ({} files)",
                self.files.len()
            )));
        };
        extract::extract_file(
            &mut self.parts,
            &self.folders,
            &mut self.state,
            &self.options,
            &mut self.warnings,
            &file,
            sink,
        )
    }

    /// Extract one file to a filesystem path.
    ///
    /// The destination is created before decompression begins, so a failed
    /// extraction leaves a partial file behind.
    pub fn extract_to_path<P: AsRef<Path>>(
        &mut self,
        file_index: usize,
        path: P,
    ) -> CabinetResult<()> {
        let file = File::create(path).map_err(CabinetError::Open)?;
        let mut sink = BufWriter::new(file);
        self.extract(file_index, &mut sink)?;
        sink.flush().map_err(CabinetError::Write)?;
        Ok(())
    }
}

impl CabinetSet<File> {
    /// Open a cabinet file from the filesystem as a one-part set.
    pub fn open_path<P: AsRef<Path>>(path: P, options: Options) -> CabinetResult<Self> {
        let file = File::open(path).map_err(CabinetError::Open)?;
        Self::open(file, options)
    }

    /// Scan a file for embedded cabinets and open each hit as a set.
    pub fn scan_path<P: AsRef<Path>>(path: P, options: &Options) -> CabinetResult<Vec<Self>> {
        let path = path.as_ref();
        let mut probe = File::open(path).map_err(CabinetError::Open)?;
        let mut offsets = Vec::new();
        for item in scan(&mut probe, options)? {
            let (offset, _directory) = item?;
            offsets.push(offset);
        }
        drop(probe);

        let mut sets = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let file = File::open(path).map_err(CabinetError::Open)?;
            sets.push(Self::open_at(file, offset, options.clone())?);
        }
        Ok(sets)
    }
}
