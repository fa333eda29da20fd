//! Entry payload codecs.
//!
//! A directory record's `compression_level` selects the codec: 0 means the
//! payload is stored verbatim, anything else is a zlib-wrapped DEFLATE stream
//! produced at that level.  Only POD4–POD6 carry the field; every other
//! format stores payloads as-is.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

/// Highest level zlib understands; larger tags are clamped.
pub const MAX_LEVEL: u32 = 9;

// ── CodecId ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Stored,
    Deflate,
}

impl CodecId {
    /// Codec selected by an on-disk compression level.
    #[inline]
    pub fn from_level(level: u32) -> Self {
        if level == 0 { CodecId::Stored } else { CodecId::Deflate }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::Stored  => "stored",
            CodecId::Deflate => "deflate",
        }
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ─────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError>;
    /// Decode `data`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct StoredCodec;
impl Codec for StoredCodec {
    fn codec_id(&self) -> CodecId { CodecId::Stored }
    fn compress(&self, data: &[u8], _: u32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct DeflateCodec;
impl Codec for DeflateCodec {
    fn codec_id(&self) -> CodecId { CodecId::Deflate }

    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(MAX_LEVEL)));
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compression(format!("deflate write failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| CodecError::Compression(format!("deflate finish failed: {e}")))
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        out.try_reserve_exact(expected_len)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        // One byte past the expected size is enough to detect an overlong stream.
        ZlibDecoder::new(data)
            .take(expected_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(format!("inflate failed: {e}")))?;
        if out.len() != expected_len {
            return Err(CodecError::Decompression(format!(
                "inflated {} bytes, expected {expected_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

// ── Factory ─────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Stored  => Box::new(StoredCodec),
        CodecId::Deflate => Box::new(DeflateCodec),
    }
}

// ── CompressionPolicy ───────────────────────────────────────────────────────

/// How AddEntry picks a compression level for formats that support one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Never compress.
    #[default]
    Stored,
    /// Always try this level.
    Level(u32),
    /// Size-based levels used by the packer.
    Auto,
}

impl CompressionPolicy {
    /// Level to request for a payload of `len` bytes.
    pub fn level_for(self, len: usize) -> u32 {
        match self {
            CompressionPolicy::Stored   => 0,
            CompressionPolicy::Level(n) => n.min(MAX_LEVEL),
            CompressionPolicy::Auto => match len {
                n if n >= 4096 => 8,
                n if n >= 2048 => 4,
                n if n >= 1024 => 2,
                _              => 0,
            },
        }
    }

    /// Parse from a CLI string: `stored`, `auto` or a level `0`-`9`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "none" => Some(CompressionPolicy::Stored),
            "auto"            => Some(CompressionPolicy::Auto),
            n => n.parse::<u32>().ok().map(|l| {
                if l == 0 { CompressionPolicy::Stored } else { CompressionPolicy::Level(l.min(MAX_LEVEL)) }
            }),
        }
    }
}

/// Encode `data` at `level`, falling back to storing it when DEFLATE does
/// not shrink it.  Returns the stored bytes and the level actually used.
pub fn encode_payload(data: &[u8], level: u32) -> Result<(Vec<u8>, u32), CodecError> {
    if level == 0 || data.is_empty() {
        return Ok((data.to_vec(), 0));
    }
    let packed = get_codec(CodecId::Deflate).compress(data, level)?;
    if packed.len() >= data.len() {
        return Ok((data.to_vec(), 0));
    }
    Ok((packed, level.min(MAX_LEVEL)))
}

/// Inverse of [`encode_payload`].
pub fn decode_payload(stored: &[u8], level: u32, uncompressed_len: usize) -> Result<Vec<u8>, CodecError> {
    get_codec(CodecId::from_level(level)).decompress(stored, uncompressed_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_roundtrip() {
        let data = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(50);
        let codec = DeflateCodec;
        let packed = codec.compress(&data, 6).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn deflate_wrong_length_is_an_error() {
        let data = vec![7u8; 4096];
        let packed = DeflateCodec.compress(&data, 6).unwrap();
        assert!(matches!(
            DeflateCodec.decompress(&packed, 100),
            Err(CodecError::Decompression(_))
        ));
        assert!(matches!(
            DeflateCodec.decompress(&packed, 5000),
            Err(CodecError::Decompression(_))
        ));
    }

    #[test]
    fn garbage_stream_fails() {
        assert!(DeflateCodec.decompress(b"not a zlib stream", 10).is_err());
    }

    #[test]
    fn incompressible_payload_is_stored() {
        let data: Vec<u8> = (0..64u8).collect();
        let (stored, level) = encode_payload(&data, 9).unwrap();
        assert_eq!(level, 0);
        assert_eq!(stored, data);
    }

    #[test]
    fn auto_policy_thresholds() {
        let p = CompressionPolicy::Auto;
        assert_eq!(p.level_for(100), 0);
        assert_eq!(p.level_for(1024), 2);
        assert_eq!(p.level_for(2048), 4);
        assert_eq!(p.level_for(4096), 8);
        assert_eq!(CompressionPolicy::Level(12).level_for(1), MAX_LEVEL);
        assert_eq!(CompressionPolicy::Stored.level_for(1 << 20), 0);
    }

    #[test]
    fn policy_from_name() {
        assert_eq!(CompressionPolicy::from_name("auto"), Some(CompressionPolicy::Auto));
        assert_eq!(CompressionPolicy::from_name("0"), Some(CompressionPolicy::Stored));
        assert_eq!(CompressionPolicy::from_name("6"), Some(CompressionPolicy::Level(6)));
        assert_eq!(CompressionPolicy::from_name("fast"), None);
    }
}
