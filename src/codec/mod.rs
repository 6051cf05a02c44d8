//! Block codecs for the native `zbag` container.
//!
//! Each codec has a frozen one-byte id written into every block header.
//! An id is never reused, even if a codec is retired.  A reader that meets
//! an id it does not know fails hard; there is no fallback codec.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Frozen on-disk ids ───────────────────────────────────────────────────────

pub const ID_NONE:   u8 = 0;
pub const ID_ZSTD:   u8 = 1;
pub const ID_LZ4:    u8 = 2;
pub const ID_BROTLI: u8 = 3;
pub const ID_LZMA:   u8 = 4;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    None,
    Zstd,
    Lz4,
    Brotli,
    Lzma,
}

impl CodecId {
    /// The byte written to disk for this codec.
    #[inline]
    pub fn id(self) -> u8 {
        match self {
            CodecId::None   => ID_NONE,
            CodecId::Zstd   => ID_ZSTD,
            CodecId::Lz4    => ID_LZ4,
            CodecId::Brotli => ID_BROTLI,
            CodecId::Lzma   => ID_LZMA,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, CodecError> {
        match id {
            ID_NONE   => Ok(CodecId::None),
            ID_ZSTD   => Ok(CodecId::Zstd),
            ID_LZ4    => Ok(CodecId::Lz4),
            ID_BROTLI => Ok(CodecId::Brotli),
            ID_LZMA   => Ok(CodecId::Lzma),
            other     => Err(CodecError::UnknownCodec(other)),
        }
    }

    /// Human-readable name (diagnostics and CLI).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None   => "none",
            CodecId::Zstd   => "zstd",
            CodecId::Lz4    => "lz4",
            CodecId::Brotli => "brotli",
            CodecId::Lzma   => "lzma",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"   => Some(CodecId::None),
            "zstd"   => Some(CodecId::Zstd),
            "lz4"    => Some(CodecId::Lz4),
            "brotli" => Some(CodecId::Brotli),
            "lzma"   => Some(CodecId::Lzma),
            _        => None,
        }
    }

    pub fn compress(self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecId::None => Ok(data.to_vec()),
            CodecId::Zstd => {
                zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
            }
            CodecId::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CodecId::Brotli => {
                let quality = level.clamp(0, 11) as u32;
                let mut out = Vec::new();
                {
                    let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
                    w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
                }
                Ok(out)
            }
            CodecId::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut out)
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                Ok(out)
            }
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecId::None => Ok(data.to_vec()),
            CodecId::Zstd => {
                zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
            }
            CodecId::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| CodecError::Decompression(e.to_string())),
            CodecId::Brotli => {
                let mut out = Vec::new();
                brotli::Decompressor::new(data, 4096)
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
            CodecId::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_decompress(&mut io::Cursor::new(data), &mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
        }
    }
}

impl Default for CodecId {
    fn default() -> Self { CodecId::Zstd }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The block names a codec this build does not know.  Decoding MUST NOT continue.
    #[error("Unknown codec id {0}")]
    UnknownCodec(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CodecId; 5] =
        [CodecId::None, CodecId::Zstd, CodecId::Lz4, CodecId::Brotli, CodecId::Lzma];

    #[test]
    fn every_codec_restores_input() {
        let data = b"the quick brown fox jumps over the lazy dog, twice: the quick brown fox";
        for codec in ALL {
            let packed = codec.compress(data, 3).unwrap();
            assert_eq!(codec.decompress(&packed).unwrap(), data, "{}", codec.name());
        }
    }

    #[test]
    fn ids_and_names_are_stable() {
        for codec in ALL {
            assert_eq!(CodecId::from_id(codec.id()).unwrap(), codec);
            assert_eq!(CodecId::from_name(codec.name()), Some(codec));
        }
        assert_eq!(CodecId::from_name("ZSTD"), Some(CodecId::Zstd));
        assert!(matches!(CodecId::from_id(200), Err(CodecError::UnknownCodec(200))));
    }
}
