//! [`PodFile`]: one archive bound to a path, with the uniform operation set
//! callers use regardless of format.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{Archive, EntryMetadata, PreparedEntry};
use crate::codec::CompressionPolicy;
use crate::entry::Entry;
use crate::error::{PodError, PodResult};
use crate::format::FormatTag;
use crate::report;
use crate::volume;

/// Selects an entry by directory index or by exact name.
#[derive(Debug, Clone, Copy)]
pub enum EntryRef<'a> {
    Index(usize),
    Name(&'a [u8]),
}

impl From<usize> for EntryRef<'_> {
    fn from(i: usize) -> Self { EntryRef::Index(i) }
}

impl<'a> From<&'a str> for EntryRef<'a> {
    fn from(name: &'a str) -> Self { EntryRef::Name(name.as_bytes()) }
}

pub struct PodFile {
    path:    PathBuf,
    archive: Archive,
}

impl PodFile {
    // ── Constructors ────────────────────────────────────────────────────────

    /// Open `path`, detecting the format from its magic.
    pub fn open<P: AsRef<Path>>(path: P) -> PodResult<Self> {
        let path = path.as_ref().to_owned();
        let archive = Archive::open(&path, None)?;
        Ok(Self { path, archive })
    }

    /// Open `path`, requiring it to be a `tag` archive.
    pub fn open_as<P: AsRef<Path>>(path: P, tag: FormatTag) -> PodResult<Self> {
        let path = path.as_ref().to_owned();
        let archive = Archive::open(&path, Some(tag))?;
        Ok(Self { path, archive })
    }

    /// Empty in-memory archive that [`PodFile::write`] will store at `path`.
    pub fn create<P: AsRef<Path>>(path: P, tag: FormatTag) -> Self {
        Self { path: path.as_ref().to_owned(), archive: Archive::create_empty(tag) }
    }

    /// Like [`PodFile::create`] with the format given by name (`pod3`, `EPD`, ...).
    pub fn create_named<P: AsRef<Path>>(path: P, format: &str) -> PodResult<Self> {
        Ok(Self::create(path, FormatTag::from_name(format)?))
    }

    pub fn from_archive<P: AsRef<Path>>(path: P, archive: Archive) -> Self {
        Self { path: path.as_ref().to_owned(), archive }
    }

    // ── Metadata ────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }
    pub fn format(&self) -> FormatTag { self.archive.format() }
    pub fn archive(&self) -> &Archive { &self.archive }
    pub fn archive_mut(&mut self) -> &mut Archive { &mut self.archive }
    pub fn into_archive(self) -> Archive { self.archive }

    /// Number of entries whose name contains `pattern` (all when `None`).
    pub fn count(&self, pattern: Option<&str>) -> usize {
        self.archive.count(pattern)
    }

    // ── Whole-archive operations ────────────────────────────────────────────

    /// File-level checksum of the archive as it would be written now.
    pub fn checksum(&mut self) -> PodResult<u32> {
        self.archive.checksum()
    }

    /// Recompute the checksum and write to `dest`, or to the bound path.
    pub fn write(&mut self, dest: Option<&Path>) -> PodResult<u64> {
        let dest = dest.map(Path::to_path_buf).unwrap_or_else(|| self.path.clone());
        let written = self.archive.serialize(&dest)?;
        let crc = self.archive.computed_checksum();
        debug!(checksum = format_args!("{crc:#010x}"), "checksum refreshed on write");
        Ok(written)
    }

    /// Extract matching entries below `dest`.  POD5 and POD6 continue
    /// through their `next_archive` chain.
    pub fn extract<P: AsRef<Path>>(&self, pattern: Option<&str>, dest: P) -> PodResult<usize> {
        match self.format() {
            FormatTag::Pod5 | FormatTag::Pod6 => volume::extract_chain(&self.path, &self.archive, pattern, dest.as_ref()),
            FormatTag::Pod1 | FormatTag::Pod2 | FormatTag::Pod3 | FormatTag::Pod4 | FormatTag::Epd => {
                self.archive.extract_all(pattern, dest)
            }
        }
    }

    /// Append every entry of `src` in directory order.  Stored bytes are
    /// copied as-is when this format can represent their encoding; otherwise
    /// they are inflated first.  Returns the number of entries added.
    pub fn merge(&mut self, src: &PodFile) -> PodResult<usize> {
        let raw_ok = self.format().spec().has_compression;
        let src_ar = &src.archive;
        for (i, e) in src_ar.entries().iter().enumerate() {
            let prepared = if e.compression_level == 0 || raw_ok {
                PreparedEntry::from_stored(e, src_ar.entry_bytes(i)?)
            } else {
                let data = src_ar.entry_data(i)?;
                let meta = EntryMetadata::default()
                    .with_timestamp(e.timestamp)
                    .with_compression(CompressionPolicy::Stored);
                self.archive.prepare(&e.name, &data, &meta)?
            };
            self.archive.add_prepared(prepared)?;
        }
        info!(
            from = %src.path.display(),
            into = %self.path.display(),
            entries = src_ar.len(),
            "merged archives"
        );
        Ok(src_ar.len())
    }

    /// Drop all entries, keeping the format and path.
    pub fn reset(&mut self) {
        self.archive.reset();
    }

    /// Diagnostic report for entries matching `pattern`.
    pub fn print<W: Write>(&self, pattern: Option<&str>, out: W) -> PodResult<()> {
        Ok(report::print(&self.archive, pattern, out)?)
    }

    // ── Per-entry operations ────────────────────────────────────────────────

    /// Resolve an [`EntryRef`] to a directory index.
    pub fn entry_index<'a, R: Into<EntryRef<'a>>>(&self, entry: R) -> PodResult<usize> {
        match entry.into() {
            EntryRef::Index(index) => {
                self.archive.entry(index)?;
                Ok(index)
            }
            EntryRef::Name(name) => self.archive.find(name).ok_or(PodError::IndexOutOfRange {
                index: self.archive.len(),
                count: self.archive.len(),
            }),
        }
    }

    /// Decoded payload of one entry.
    pub fn get_entry<'a, R: Into<EntryRef<'a>>>(&self, entry: R) -> PodResult<Vec<u8>> {
        self.archive.entry_data(self.entry_index(entry)?)
    }

    pub fn add_entry(&mut self, name: &[u8], data: &[u8], meta: &EntryMetadata) -> PodResult<usize> {
        self.archive.add_entry(name, data, meta)
    }

    pub fn delete_entry<'a, R: Into<EntryRef<'a>>>(&mut self, entry: R) -> PodResult<Entry> {
        let index = self.entry_index(entry)?;
        self.archive.delete_entry(index)
    }

    /// CRC over one entry's stored bytes.
    pub fn entry_checksum<'a, R: Into<EntryRef<'a>>>(&self, entry: R) -> PodResult<u32> {
        self.archive.entry_checksum(self.entry_index(entry)?)
    }

    pub fn extract_entry<'a, R: Into<EntryRef<'a>>, P: AsRef<Path>>(&self, entry: R, dest: P) -> PodResult<u64> {
        self.archive.extract_entry(self.entry_index(entry)?, dest)
    }
}
