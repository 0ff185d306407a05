//! Uncompressed (store) block decoder

use crate::error::{CodecError, CodecResult};

/// Decoder for uncompressed folders: every block is a verbatim copy.
#[derive(Debug, Default)]
pub struct StoreDecoder {
    _private: (),
}

impl StoreDecoder {
    /// Create a store decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy one block through, enforcing the declared length.
    pub fn decode_block(
        &mut self,
        input: &[u8],
        uncompressed_len: usize,
        out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        if input.len() != uncompressed_len {
            return Err(CodecError::OutputMismatch {
                expected: uncompressed_len,
                got: input.len(),
            });
        }
        out.extend_from_slice(input);
        Ok(())
    }
}
