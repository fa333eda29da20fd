//! CRC-32 over byte ranges.
//!
//! Used for the file-level checksum, every per-entry checksum and the
//! audit-record checksum shown in diagnostics.

use crc32fast::Hasher;

/// CRC-32 (IEEE) of `bytes`.
#[inline]
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// CRC-32 over several discontiguous slices, as if they were concatenated.
pub fn checksum_parts<'a, I>(parts: I) -> u32
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}
