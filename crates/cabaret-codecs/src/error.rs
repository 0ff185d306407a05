//! Codec error types

use thiserror::Error;

/// Errors raised by block decoders.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compression method tag not one of the defined values
    #[error("unknown compression method: 0x{0:04X}")]
    UnknownMethod(u16),

    /// Window-size parameter outside the method's legal range
    #[error("invalid {method} window size: {window} bits")]
    InvalidWindow {
        /// Method name for diagnostics
        method: &'static str,
        /// The rejected window exponent
        window: u8,
    },

    /// Quantum level parameter outside 1..=7
    #[error("invalid Quantum level: {0}")]
    InvalidLevel(u8),

    /// Per-block signature bytes did not match
    #[error("bad block signature: expected [43 4B], got {0:02X?}")]
    BadBlockSignature([u8; 2]),

    /// Compressed payload could not be decoded
    #[error("corrupt block data: {0}")]
    Corrupt(String),

    /// Block decoded to a different length than its header declared
    #[error("block output mismatch: expected {expected} bytes, got {got}")]
    OutputMismatch {
        /// Length the block header declared
        expected: usize,
        /// Length the decoder produced
        got: usize,
    },

    /// Method is recognized but no bit-level decoder is wired in
    #[error("unsupported compression method: {0}")]
    Unsupported(&'static str),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
