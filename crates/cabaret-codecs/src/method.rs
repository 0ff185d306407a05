//! Compression method tag parsing

use crate::error::{CodecError, CodecResult};

/// Legal Quantum window exponents (1 KiB to 2 MiB).
const QUANTUM_WINDOW: std::ops::RangeInclusive<u8> = 10..=21;
/// Legal LZX window exponents (32 KiB to 2 MiB).
const LZX_WINDOW: std::ops::RangeInclusive<u8> = 15..=21;

/// A folder's compression method and its method-specific parameters.
///
/// Folders carry a 16-bit type field: the low four bits select the method,
/// Quantum packs its level into bits 4..8 and its window exponent into bits
/// 8..13, and LZX packs its window exponent into bits 8..13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression, blocks hold raw data.
    None,
    /// MSZIP: one raw deflate stream per block, history carried across blocks.
    Mszip,
    /// Quantum arithmetic coder.
    Quantum {
        /// Compression level, 1..=7.
        level: u8,
        /// Window exponent, 10..=21.
        window: u8,
    },
    /// LZX sliding-window coder.
    Lzx {
        /// Window exponent, 15..=21.
        window: u8,
    },
}

impl CompressionMethod {
    /// Parse the folder descriptor's 16-bit compression type field.
    pub fn from_bitfield(bits: u16) -> CodecResult<Self> {
        let window = ((bits >> 8) & 0x1F) as u8;
        match bits & 0x000F {
            0 => Ok(Self::None),
            1 => Ok(Self::Mszip),
            2 => {
                let level = ((bits >> 4) & 0x0F) as u8;
                if !(1..=7).contains(&level) {
                    return Err(CodecError::InvalidLevel(level));
                }
                if !QUANTUM_WINDOW.contains(&window) {
                    return Err(CodecError::InvalidWindow {
                        method: "Quantum",
                        window,
                    });
                }
                Ok(Self::Quantum { level, window })
            }
            3 => {
                if !LZX_WINDOW.contains(&window) {
                    return Err(CodecError::InvalidWindow {
                        method: "LZX",
                        window,
                    });
                }
                Ok(Self::Lzx { window })
            }
            _ => Err(CodecError::UnknownMethod(bits)),
        }
    }

    /// Encode back into the descriptor bitfield.
    pub fn to_bitfield(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Mszip => 1,
            Self::Quantum { level, window } => {
                2 | (u16::from(level) << 4) | (u16::from(window) << 8)
            }
            Self::Lzx { window } => 3 | (u16::from(window) << 8),
        }
    }

    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "store",
            Self::Mszip => "MSZIP",
            Self::Quantum { .. } => "Quantum",
            Self::Lzx { .. } => "LZX",
        }
    }
}
