//! Multi-volume archives (POD5, POD6).
//!
//! A volume names its successor in the header's `next_archive` field,
//! relative to its own directory.  Extraction walks that chain; the
//! [`VolumeWriter`] produces it, starting a new volume before the current
//! one would reach the volume limit.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::{Archive, EntryMetadata};
use crate::error::{PodError, PodResult};
use crate::format::FormatTag;

/// Largest size a volume may grow to before the writer rolls over.
pub const VOLUME_LIMIT: u64 = 0x7FFF_FFFF;

/// Path of the volume following `ar`, which was loaded from `path`.
pub fn next_volume(path: &Path, ar: &Archive) -> Option<PathBuf> {
    if !ar.format().spec().has_next_archive {
        return None;
    }
    let name = ar.header().next_archive_text();
    if name.is_empty() {
        return None;
    }
    let name = String::from_utf8_lossy(name).into_owned();
    Some(match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    })
}

fn chain_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Extract `first` (loaded from `path`) and every volume after it.
///
/// Each following volume is opened with format detection and released once
/// extracted.  A chain that returns to a volume already visited fails with
/// [`PodError::VolumeCycle`] before anything from it is written.
pub fn extract_chain(path: &Path, first: &Archive, pattern: Option<&str>, dest: &Path) -> PodResult<usize> {
    let mut visited = HashSet::new();
    visited.insert(chain_key(path));

    let mut total = first.extract_all(pattern, dest)?;
    let mut next = next_volume(path, first);
    while let Some(volume_path) = next {
        if !visited.insert(chain_key(&volume_path)) {
            return Err(PodError::VolumeCycle(volume_path));
        }
        let volume = Archive::open(&volume_path, None)?;
        total += volume.extract_all(pattern, dest)?;
        info!(volume = %volume_path.display(), total, "followed next archive");
        next = next_volume(&volume_path, &volume);
    }
    Ok(total)
}

/// Name of volume number `n` (1 for the second volume) after `first`:
/// the first file name minus its last four characters, the two-digit
/// volume number, and `.POD`, upper-cased.
pub fn volume_name(first: &Path, n: usize) -> String {
    let file = first
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let chars: Vec<char> = file.chars().collect();
    let keep = chars.len().saturating_sub(4);
    let base: String = chars[..keep].iter().collect();
    format!("{base}{n:02}.POD").to_uppercase()
}

// ── VolumeWriter ────────────────────────────────────────────────────────────

/// Packs entries into a chain of volumes.
///
/// Formats without a `next_archive` field never roll over; they fail once
/// offsets no longer fit in 32 bits.
pub struct VolumeWriter {
    tag:          FormatTag,
    first_path:   PathBuf,
    current_path: PathBuf,
    current:      Archive,
    limit:        u64,
    written:      Vec<PathBuf>,
}

impl VolumeWriter {
    pub fn new<P: AsRef<Path>>(path: P, tag: FormatTag) -> Self {
        let path = path.as_ref().to_owned();
        Self {
            tag,
            first_path: path.clone(),
            current_path: path,
            current: Archive::create_empty(tag),
            limit: VOLUME_LIMIT,
            written: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Volume currently being filled.
    pub fn current(&self) -> &Archive { &self.current }
    pub fn current_mut(&mut self) -> &mut Archive { &mut self.current }
    pub fn current_path(&self) -> &Path { &self.current_path }

    /// Add an entry, starting a new volume first if this one would reach
    /// the limit.  An entry that alone reaches the limit is rejected.
    pub fn add(&mut self, name: &[u8], data: &[u8], meta: &EntryMetadata) -> PodResult<usize> {
        let prepared = self.current.prepare(name, data, meta)?;
        if self.tag.spec().has_next_archive {
            let size = prepared.stored_len();
            if size >= self.limit {
                return Err(PodError::TooLarge { size, limit: self.limit });
            }
            if !self.current.is_empty() && self.current.size() + size >= self.limit {
                self.roll()?;
            }
        }
        self.current.add_prepared(prepared)
    }

    fn roll(&mut self) -> PodResult<()> {
        let next_name = volume_name(&self.first_path, self.written.len() + 1);
        self.current.set_next_archive(next_name.as_bytes())?;
        self.current.serialize(&self.current_path)?;
        info!(
            volume = %self.current_path.display(),
            next = %next_name,
            entries = self.current.len(),
            "volume full, continuing"
        );

        let mut fresh = Archive::create_empty(self.tag);
        fresh.header_mut().set_comment(self.current.header().comment_text());
        self.written.push(std::mem::replace(&mut self.current_path, self.first_path.with_file_name(&next_name)));
        self.current = fresh;
        Ok(())
    }

    /// Write the last volume and return every volume path in chain order.
    pub fn finish(mut self) -> PodResult<Vec<PathBuf>> {
        self.current.serialize(&self.current_path)?;
        self.written.push(self.current_path);
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_names() {
        assert_eq!(volume_name(Path::new("/tmp/data.pod"), 1), "DATA01.POD");
        assert_eq!(volume_name(Path::new("maps.POD"), 12), "MAPS12.POD");
        assert_eq!(volume_name(Path::new("abc"), 2), "02.POD");
    }

    #[test]
    fn next_volume_is_relative_to_current() {
        let mut ar = Archive::create_empty(FormatTag::Pod5);
        assert_eq!(next_volume(Path::new("/x/a.pod"), &ar), None);
        ar.set_next_archive(b"A01.POD").unwrap();
        assert_eq!(next_volume(Path::new("/x/a.pod"), &ar), Some(PathBuf::from("/x/A01.POD")));
        let pod3 = Archive::create_empty(FormatTag::Pod3);
        assert_eq!(next_volume(Path::new("/x/a.pod"), &pod3), None);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let mut w = VolumeWriter::new("/nonexistent/a.pod", FormatTag::Pod6).with_limit(16);
        let err = w.add(b"big", &[0u8; 32], &EntryMetadata::default()).unwrap_err();
        assert!(matches!(err, PodError::TooLarge { size: 32, limit: 16 }));
    }

    #[test]
    fn non_chain_formats_ignore_the_limit() {
        let mut w = VolumeWriter::new("/nonexistent/a.pod", FormatTag::Pod3).with_limit(16);
        w.add(b"one", &[1u8; 32], &EntryMetadata::default()).unwrap();
        w.add(b"two", &[2u8; 32], &EntryMetadata::default()).unwrap();
        assert_eq!(w.current().len(), 2);
    }
}
