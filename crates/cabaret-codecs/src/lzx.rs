//! LZX decoder seam
//!
//! The bit-level LZX decoder is not part of this crate. The seam still
//! carries the parameters the container engine negotiates: the window
//! exponent from the folder descriptor, and the exact total output length
//! the engine must announce before the folder's final block so the stream
//! framing can terminate.

use crate::error::{CodecError, CodecResult};

/// Decoder seam for LZX folders.
#[derive(Debug)]
pub struct LzxDecoder {
    window: u8,
    output_length: Option<u64>,
}

impl LzxDecoder {
    /// Validate the window exponent (15..=21) and create the seam.
    pub fn new(window: u8) -> CodecResult<Self> {
        if !(15..=21).contains(&window) {
            return Err(CodecError::InvalidWindow {
                method: "LZX",
                window,
            });
        }
        Ok(Self {
            window,
            output_length: None,
        })
    }

    /// Window exponent negotiated at init.
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Record the folder's total uncompressed length.
    ///
    /// Must be called before the final block is decoded.
    pub fn set_output_length(&mut self, total: u64) {
        self.output_length = Some(total);
    }

    /// Total output length, once announced.
    pub fn output_length(&self) -> Option<u64> {
        self.output_length
    }

    /// Bit-level decoding is not wired in.
    pub fn decode_block(
        &mut self,
        _input: &[u8],
        _uncompressed_len: usize,
        _out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        Err(CodecError::Unsupported("LZX"))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        assert!(LzxDecoder::new(14).is_err());
        assert!(LzxDecoder::new(15).is_ok());
        assert!(LzxDecoder::new(21).is_ok());
        assert!(LzxDecoder::new(22).is_err());
    }

    #[test]
    fn output_length_is_recorded() {
        let mut decoder = LzxDecoder::new(16).expect("window 16");
        assert_eq!(decoder.output_length(), None);
        decoder.set_output_length(987_654);
        assert_eq!(decoder.output_length(), Some(987_654));
    }

    #[test]
    fn decode_reports_unsupported() {
        let mut decoder = LzxDecoder::new(15).expect("window 15");
        let mut out = Vec::new();
        assert!(matches!(
            decoder.decode_block(&[0u8; 8], 8, &mut out),
            Err(CodecError::Unsupported("LZX"))
        ));
    }
}
