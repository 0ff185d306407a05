//! Quantum decoder seam
//!
//! Parameter validation only; the arithmetic coder itself is not wired in.

use crate::error::{CodecError, CodecResult};

/// Decoder seam for Quantum folders.
#[derive(Debug)]
pub struct QuantumDecoder {
    level: u8,
    window: u8,
}

impl QuantumDecoder {
    /// Validate level (1..=7) and window exponent (10..=21).
    pub fn new(level: u8, window: u8) -> CodecResult<Self> {
        if !(1..=7).contains(&level) {
            return Err(CodecError::InvalidLevel(level));
        }
        if !(10..=21).contains(&window) {
            return Err(CodecError::InvalidWindow {
                method: "Quantum",
                window,
            });
        }
        Ok(Self { level, window })
    }

    /// Compression level negotiated at init.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Window exponent negotiated at init.
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Bit-level decoding is not wired in.
    pub fn decode_block(
        &mut self,
        _input: &[u8],
        _uncompressed_len: usize,
        _out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        Err(CodecError::Unsupported("Quantum"))
    }
}
