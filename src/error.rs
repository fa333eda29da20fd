//! Error types for archive operations.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// Result alias used throughout the crate.
pub type PodResult<T> = Result<T, PodError>;

#[derive(Error, Debug)]
pub enum PodError {
    /// The magic bytes match no known format, or not the one requested.
    #[error("Format mismatch: expected {expected}, found magic {found:?}")]
    FormatMismatch { expected: String, found: String },

    /// Payload accounting is inconsistent with the file size.
    #[error("Size mismatch: payload region is {expected} bytes, entries and gaps account for {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Entry index {index} out of range ({count} entries)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    #[error("Compression error: {0}")]
    Compression(#[from] CodecError),

    #[error("Name '{name}' does not fit a {max}-byte field")]
    NameTooLong { name: String, max: usize },

    /// Names are NUL-terminated on disk, so an embedded NUL cannot round-trip.
    #[error("Entry name contains a NUL byte: {0:?}")]
    InvalidName(String),

    /// Extraction target would escape the destination directory.
    #[error("Unsafe entry path: {0}")]
    UnsafePath(String),

    /// A `next_archive` chain leads back to a volume already visited.
    #[error("Volume chain revisits {}", .0.display())]
    VolumeCycle(PathBuf),

    #[error("Archive too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },
}

impl PodError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: &[u8]) -> Self {
        PodError::FormatMismatch {
            expected: expected.into(),
            found:    String::from_utf8_lossy(&found[..found.len().min(4)]).into_owned(),
        }
    }
}
