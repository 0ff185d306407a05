//! Directory engine and streaming block decompression for cabinet-style
//! containers
//!
//! This crate parses compound binary containers that store many logical
//! files inside compressed folders, where a folder's compressed byte stream
//! may span several physical archive files on disk. Two container families
//! are covered:
//!
//! - **Cabinet archives** ([`cabinet`]): folder/file directory headers,
//!   multi-part set merging, a forward-only block decompression cursor with
//!   per-block checksum enforcement, and a signature scanner that recovers
//!   cabinets embedded in arbitrary data.
//! - **Compressed help files** ([`chm`]): the chunked on-disk directory
//!   index with its quick-reference tables, ENCINT-encoded entries, and the
//!   two-phase (binary, then linear) name search that resolves a file
//!   without walking the whole directory.
//!
//! Bit-level entropy decoders live behind the [`cabaret_codecs`] seam; this
//! crate owns everything around them: header validation and linking, block
//! framing, checksums, size limits, and multi-part continuation.
//!
//! # Strictness
//!
//! All parsing is strict by default. [`Options::salvage`] downgrades many
//! structural errors to collected warnings for best-effort recovery of
//! damaged archives, and [`Options::tolerate_bad_checksums`] does the same
//! for per-block checksum mismatches. Signature mismatches are always
//! fatal, in every mode.

#![warn(missing_docs)]

pub mod cabinet;
pub mod chm;
mod diag;
mod options;

pub use diag::Warnings;
pub use options::Options;
