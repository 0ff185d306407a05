//! Help-file error types

use thiserror::Error;

/// Errors raised by the help-file directory engine and extractor.
#[derive(Debug, Error)]
pub enum ChmError {
    /// Source could not be opened
    #[error("open failed: {0}")]
    Open(#[source] std::io::Error),

    /// Read from the source failed
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Write to the extraction sink failed
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Seek on the source failed
    #[error("seek failed: {0}")]
    Seek(#[source] std::io::Error),

    /// A header or chunk signature did not match
    #[error("bad signature: {0:02X?}")]
    BadSignature([u8; 4]),

    /// Structural or logical invariant violated by the on-disk data
    #[error("bad help-file data: {0}")]
    DataFormat(String),

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

/// Result type for help-file operations.
pub type ChmResult<T> = Result<T, ChmError>;
