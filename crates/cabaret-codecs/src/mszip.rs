//! MSZIP block decoder
//!
//! Every MSZIP block is a two-byte `CK` signature followed by one raw
//! deflate stream. The deflate history window is *not* reset between the
//! blocks of a folder: block N may reference data produced by block N-1, so
//! the decoder carries the last 32 KiB of folder output as the dictionary
//! for the next block.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{CodecError, CodecResult};
use crate::MAX_BLOCK_UNCOMPRESSED;

/// Block signature preceding each deflate stream.
const MSZIP_SIGNATURE: [u8; 2] = *b"CK";

/// Decoder for MSZIP folders.
#[derive(Debug, Default)]
pub struct MszipDecoder {
    /// Last 32 KiB of uncompressed folder output, the next block's dictionary.
    history: Vec<u8>,
}

impl MszipDecoder {
    /// Create an MSZIP decoder with an empty history window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one MSZIP block, appending exactly `uncompressed_len` bytes.
    pub fn decode_block(
        &mut self,
        input: &[u8],
        uncompressed_len: usize,
        out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        if input.len() < 2 {
            return Err(CodecError::Corrupt(
                "block shorter than the MSZIP signature".into(),
            ));
        }
        if input[0..2] != MSZIP_SIGNATURE {
            return Err(CodecError::BadBlockSignature([input[0], input[1]]));
        }
        let deflate = &input[2..];

        let mut inflate = Decompress::new(false);
        if !self.history.is_empty() {
            inflate
                .set_dictionary(&self.history)
                .map_err(|e| CodecError::Corrupt(format!("history window rejected: {e}")))?;
        }

        let start = out.len();
        out.reserve(uncompressed_len);
        loop {
            let in_before = inflate.total_in();
            let out_before = out.len();
            let status = inflate
                .decompress_vec(
                    &deflate[in_before as usize..],
                    out,
                    FlushDecompress::Finish,
                )
                .map_err(|e| CodecError::Corrupt(format!("inflate failed: {e}")))?;
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if out.len() - start > uncompressed_len {
                        return Err(CodecError::Corrupt(
                            "deflate stream ran past the declared block length".into(),
                        ));
                    }
                    if inflate.total_in() == in_before && out.len() == out_before {
                        return Err(CodecError::Corrupt("truncated deflate stream".into()));
                    }
                }
            }
        }

        let produced = out.len() - start;
        if produced != uncompressed_len {
            return Err(CodecError::OutputMismatch {
                expected: uncompressed_len,
                got: produced,
            });
        }
        self.push_history(&out[start..]);
        Ok(())
    }

    /// Append a block's output to the carried window, keeping the last 32 KiB.
    fn push_history(&mut self, block: &[u8]) {
        if block.len() >= MAX_BLOCK_UNCOMPRESSED {
            self.history.clear();
            self.history
                .extend_from_slice(&block[block.len() - MAX_BLOCK_UNCOMPRESSED..]);
        } else {
            let keep = MAX_BLOCK_UNCOMPRESSED - block.len();
            if self.history.len() > keep {
                let excess = self.history.len() - keep;
                self.history.drain(..excess);
            }
            self.history.extend_from_slice(block);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::{Compress, Compression, FlushCompress};

    /// Deflate `data` as one raw stream, optionally primed with a dictionary.
    fn deflate_block(data: &[u8], dictionary: &[u8]) -> Vec<u8> {
        let mut compress = Compress::new(Compression::default(), false);
        if !dictionary.is_empty() {
            compress
                .set_dictionary(dictionary)
                .expect("compressor dictionary");
        }
        let mut encoded = Vec::with_capacity(data.len() + 256);
        loop {
            let consumed = compress.total_in() as usize;
            let status = compress
                .compress_vec(&data[consumed..], &mut encoded, FlushCompress::Finish)
                .expect("deflate");
            if status == flate2::Status::StreamEnd {
                break;
            }
            encoded.reserve(512);
        }
        let mut block = Vec::with_capacity(2 + encoded.len());
        block.extend_from_slice(&MSZIP_SIGNATURE);
        block.extend_from_slice(&encoded);
        block
    }

    #[test]
    fn decodes_a_single_block() {
        let payload = b"the quick brown fox jumps over the lazy dog";
        let block = deflate_block(payload, &[]);

        let mut decoder = MszipDecoder::new();
        let mut out = Vec::new();
        decoder
            .decode_block(&block, payload.len(), &mut out)
            .expect("decode");
        assert_eq!(out, payload);
    }

    #[test]
    fn carries_history_across_blocks() {
        let first: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        // Second block repeats the first, so a primed compressor emits
        // back-references into block one's output.
        let second = first.clone();

        let block1 = deflate_block(&first, &[]);
        let block2 = deflate_block(&second, &first);

        let mut decoder = MszipDecoder::new();
        let mut out = Vec::new();
        decoder
            .decode_block(&block1, first.len(), &mut out)
            .expect("first block");
        decoder
            .decode_block(&block2, second.len(), &mut out)
            .expect("second block");
        assert_eq!(&out[..first.len()], first.as_slice());
        assert_eq!(&out[first.len()..], second.as_slice());
    }

    #[test]
    fn rejects_a_bad_signature() {
        let mut block = deflate_block(b"data", &[]);
        block[0] = b'X';
        let mut decoder = MszipDecoder::new();
        let mut out = Vec::new();
        assert!(matches!(
            decoder.decode_block(&block, 4, &mut out),
            Err(CodecError::BadBlockSignature(_))
        ));
    }

    #[test]
    fn rejects_a_length_mismatch() {
        let block = deflate_block(b"data", &[]);
        let mut decoder = MszipDecoder::new();
        let mut out = Vec::new();
        assert!(decoder.decode_block(&block, 3, &mut out).is_err());
        let mut out = Vec::new();
        let mut decoder = MszipDecoder::new();
        assert!(decoder.decode_block(&block, 5, &mut out).is_err());
    }

    #[test]
    fn rejects_truncated_streams() {
        let block = deflate_block(b"some data that compresses", &[]);
        let truncated = &block[..block.len() - 3];
        let mut decoder = MszipDecoder::new();
        let mut out = Vec::new();
        assert!(decoder.decode_block(truncated, 25, &mut out).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        proptest! {
            /// Any byte sequence survives a single-block round trip.
            #[test]
            fn single_block_round_trip(data in prop::collection::vec(any::<u8>(), 1..4096)) {
                let block = deflate_block(&data, &[]);
                let mut decoder = MszipDecoder::new();
                let mut out = Vec::new();
                decoder
                    .decode_block(&block, data.len(), &mut out)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(out, data);
            }

            /// Splitting a stream into two blocks with carried history is
            /// equivalent to decoding it whole.
            #[test]
            fn two_block_round_trip(
                first in prop::collection::vec(any::<u8>(), 1..2048),
                second in prop::collection::vec(any::<u8>(), 1..2048),
            ) {
                let block1 = deflate_block(&first, &[]);
                let block2 = deflate_block(&second, &first);
                let mut decoder = MszipDecoder::new();
                let mut out = Vec::new();
                decoder
                    .decode_block(&block1, first.len(), &mut out)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                decoder
                    .decode_block(&block2, second.len(), &mut out)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let mut expected = first;
                expected.extend_from_slice(&second);
                prop_assert_eq!(out, expected);
            }
        }
    }
}
