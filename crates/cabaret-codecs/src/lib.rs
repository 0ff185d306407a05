//! Block decoders for cabinet-style containers
//!
//! Cabinet folders store their data as a sequence of framing blocks, each
//! holding up to 32 KiB of uncompressed data. The container engine owns the
//! block framing (headers, checksums, folder boundaries); this crate owns
//! what happens *inside* one block. The seam between the two is
//! [`BlockDecoder::decode_block`]: one compressed payload in, exactly the
//! declared number of uncompressed bytes appended to the output.
//!
//! # Supported methods
//!
//! - **Store**: verbatim copy
//! - **MSZIP**: per-block raw deflate with a 32 KiB history window carried
//!   across blocks
//! - **Quantum**, **LZX**: window parameters are parsed and validated, but
//!   the bit-level decoders are not wired in; decoding returns
//!   [`CodecError::Unsupported`]
//!
//! Decoders are stateful across the blocks of one folder and must not be
//! reused across folders. Dropping the decoder releases all state.

#![warn(missing_docs)]

mod error;
mod lzx;
mod method;
mod mszip;
mod quantum;
mod store;

pub use error::{CodecError, CodecResult};
pub use lzx::LzxDecoder;
pub use method::CompressionMethod;
pub use mszip::MszipDecoder;
pub use quantum::QuantumDecoder;
pub use store::StoreDecoder;

/// Maximum uncompressed payload of one framing block.
pub const MAX_BLOCK_UNCOMPRESSED: usize = 32768;

/// Per-folder block decoder state machine.
///
/// One variant per supported compression method, selected from the folder's
/// [`CompressionMethod`] tag. The closed enum keeps dispatch exhaustive at
/// every call site.
#[derive(Debug)]
pub enum BlockDecoder {
    /// Verbatim copy, no compression.
    Store(StoreDecoder),
    /// Deflate-based MSZIP with carried history.
    Mszip(MszipDecoder),
    /// Quantum arithmetic coder (parameters only).
    Quantum(QuantumDecoder),
    /// LZX sliding-window coder (parameters only).
    Lzx(LzxDecoder),
}

impl BlockDecoder {
    /// Create a decoder for one folder's compression method.
    pub fn new(method: CompressionMethod) -> CodecResult<Self> {
        Ok(match method {
            CompressionMethod::None => Self::Store(StoreDecoder::new()),
            CompressionMethod::Mszip => Self::Mszip(MszipDecoder::new()),
            CompressionMethod::Quantum { level, window } => {
                Self::Quantum(QuantumDecoder::new(level, window)?)
            }
            CompressionMethod::Lzx { window } => Self::Lzx(LzxDecoder::new(window)?),
        })
    }

    /// Decode one framing block.
    ///
    /// Appends exactly `uncompressed_len` bytes to `out` or fails. `input`
    /// is the complete compressed payload of the block, with any
    /// cross-container fragments already joined by the caller.
    pub fn decode_block(
        &mut self,
        input: &[u8],
        uncompressed_len: usize,
        out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        match self {
            Self::Store(d) => d.decode_block(input, uncompressed_len, out),
            Self::Mszip(d) => d.decode_block(input, uncompressed_len, out),
            Self::Quantum(d) => d.decode_block(input, uncompressed_len, out),
            Self::Lzx(d) => d.decode_block(input, uncompressed_len, out),
        }
    }

    /// Announce the total uncompressed length of the folder's stream.
    ///
    /// LZX needs the exact output length before its final block to terminate
    /// the stream framing; every other method ignores this.
    pub fn set_output_length(&mut self, total: u64) {
        if let Self::Lzx(d) = self {
            d.set_output_length(total);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn store_round_trip_through_dispatch() {
        let mut decoder = BlockDecoder::new(CompressionMethod::None).expect("store decoder");
        let mut out = Vec::new();
        decoder
            .decode_block(b"hello blocks", 12, &mut out)
            .expect("store decode");
        assert_eq!(out, b"hello blocks");
    }

    #[test]
    fn lzx_init_validates_window() {
        assert!(BlockDecoder::new(CompressionMethod::Lzx { window: 14 }).is_err());
        assert!(BlockDecoder::new(CompressionMethod::Lzx { window: 21 }).is_ok());
    }

    #[test]
    fn set_output_length_is_a_noop_for_non_lzx() {
        let mut decoder = BlockDecoder::new(CompressionMethod::Mszip).expect("mszip decoder");
        decoder.set_output_length(123_456);
    }
}
