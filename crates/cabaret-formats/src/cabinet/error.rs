//! Cabinet error types

use thiserror::Error;

/// Errors raised by the cabinet directory engine and extractor.
#[derive(Debug, Error)]
pub enum CabinetError {
    /// Source could not be opened
    #[error("open failed: {0}")]
    Open(#[source] std::io::Error),

    /// Read from the archive source failed
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Write to the extraction sink failed
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Seek on the archive source failed
    #[error("seek failed: {0}")]
    Seek(#[source] std::io::Error),

    /// Primary header magic did not match
    #[error("not a cabinet: bad signature {0:02X?}")]
    BadSignature([u8; 4]),

    /// Structural or logical invariant violated by the on-disk data
    #[error("bad cabinet data: {0}")]
    DataFormat(String),

    /// Per-block checksum mismatch
    #[error("block {block} checksum mismatch: expected {expected:08X}, got {got:08X}")]
    Checksum {
        /// Physical block index within the folder
        block: u32,
        /// Checksum stored in the block header
        expected: u32,
        /// Checksum recomputed over the block
        got: u32,
    },

    /// Decompression precondition unmet
    #[error("cannot extract: {0}")]
    Decrunch(String),

    /// Caller passed an argument the engine cannot act on
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// Block decoder failure
    #[error("codec error: {0}")]
    Codec(#[from] cabaret_codecs::CodecError),
}

/// Result type for cabinet operations.
pub type CabinetResult<T> = Result<T, CabinetError>;

impl CabinetError {
    /// Map a binrw error onto the cabinet error kinds.
    ///
    /// I/O failures keep their identity; everything else is a data-format
    /// problem in the descriptor being parsed.
    pub(crate) fn from_binrw(err: binrw::Error, what: &str) -> Self {
        match err {
            binrw::Error::Io(e) => Self::Read(e),
            other => Self::DataFormat(format!("{what}: {other}")),
        }
    }
}
