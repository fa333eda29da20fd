//! Generic archive codec: the [`Archive`] type every format shares.
//!
//! ```no_run
//! use termpod::archive::{Archive, EntryMetadata};
//! use termpod::format::FormatTag;
//!
//! // Write
//! let mut ar = Archive::create_empty(FormatTag::Pod3);
//! ar.add_entry(b"readme.txt", b"Hello, world!", &EntryMetadata::now())?;
//! ar.serialize("out.pod")?;
//!
//! // Read
//! let ar = Archive::open("out.pod", None)?;
//! let idx = ar.find(b"readme.txt").unwrap();
//! assert_eq!(ar.entry_data(idx)?, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Buffer model
//! The archive owns one growable byte buffer.  Entries address it by
//! offset, so nothing borrowed from it survives a mutating call.
//!
//! * POD1, POD2, EPD keep `header | directory | path table | payload`.
//!   Serialize relays the whole buffer out, dropping dead bytes.
//! * POD3–POD6 keep `header | payload`; the directory, path table and
//!   audit trail are appended only in the serialized image.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::checksum::{checksum, checksum_parts};
use crate::codec::{decode_payload, encode_payload, CompressionPolicy};
use crate::entry::{AuditEntry, Entry, EntryInfo};
use crate::error::{PodError, PodResult};
use crate::format::{identify, ChecksumRange, DirectoryPlacement, FormatTag, AUDIT_ENTRY_SIZE};
use crate::header::Header;
use crate::index::{decode_directory, encode_directory, path_table_extent, PayloadAccounting};

// ── EntryMetadata ───────────────────────────────────────────────────────────

/// Caller-supplied metadata for [`Archive::add_entry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// UNIX seconds.
    pub timestamp:   u32,
    /// Ignored by formats without per-entry compression.
    pub compression: CompressionPolicy,
}

impl EntryMetadata {
    /// Metadata stamped with the current time, stored uncompressed.
    pub fn now() -> Self {
        Self { timestamp: unix_now(), compression: CompressionPolicy::Stored }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }
}

pub(crate) fn unix_now() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
}

// ── PreparedEntry ───────────────────────────────────────────────────────────

/// A payload already encoded for a particular archive, ready to append.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    pub name:              Vec<u8>,
    pub stored:            Vec<u8>,
    pub uncompressed:      u32,
    pub compression_level: u32,
    pub timestamp:         u32,
    pub checksum:          u32,
}

impl PreparedEntry {
    /// Reuse another archive's stored bytes and metadata unchanged.
    pub fn from_stored(entry: &Entry, stored: &[u8]) -> Self {
        Self {
            name:              entry.name.clone(),
            stored:            stored.to_vec(),
            uncompressed:      entry.uncompressed,
            compression_level: entry.compression_level,
            timestamp:         entry.timestamp,
            checksum:          checksum(stored),
        }
    }

    pub fn stored_len(&self) -> u64 {
        self.stored.len() as u64
    }
}

// ── Archive ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Archive {
    tag:               FormatTag,
    header:            Header,
    buffer:            Vec<u8>,
    entries:           Vec<Entry>,
    audit:             Vec<AuditEntry>,
    accounting:        PayloadAccounting,
    path_table_len:    usize,
    computed_checksum: u32,
}

impl Archive {
    // ── Constructors ────────────────────────────────────────────────────────

    /// Zero-entry archive ready for incremental adds.
    pub fn create_empty(tag: FormatTag) -> Self {
        let header = Header::new(tag);
        // Header bytes are patched in when the archive is sealed.
        let buffer = vec![0u8; tag.spec().header_size];
        let start = buffer.len() as u64;
        Self {
            tag,
            header,
            buffer,
            entries: Vec::new(),
            audit: Vec::new(),
            accounting: PayloadAccounting { start, end: start, ..Default::default() },
            path_table_len: 0,
            computed_checksum: 0,
        }
    }

    /// Read and validate the archive at `path`.  With `expected == None`
    /// the format is detected from the magic.
    pub fn open<P: AsRef<Path>>(path: P, expected: Option<FormatTag>) -> PodResult<Self> {
        let path = path.as_ref();
        let bytes = read_file(path)?;
        let ar = Self::from_bytes(bytes, expected)?;
        info!(
            path = %path.display(),
            format = %ar.tag,
            entries = ar.entries.len(),
            "opened archive"
        );
        Ok(ar)
    }

    /// Parse an in-memory image.  Takes ownership of `bytes` as the buffer.
    pub fn from_bytes(mut bytes: Vec<u8>, expected: Option<FormatTag>) -> PodResult<Self> {
        let tag = match (identify(&bytes), expected) {
            (Some(found), None) => found,
            (Some(found), Some(want)) if found == want => found,
            (_, Some(want)) => return Err(PodError::mismatch(want.to_string(), &bytes)),
            (None, None) => return Err(PodError::mismatch("a POD or EPD archive", &bytes)),
        };
        let spec = tag.spec();
        let header = Header::read(tag, &bytes)?;

        let file_len = bytes.len() as u64;
        let hs = spec.header_size as u64;
        let count = header.entry_count as usize;
        let dir_len = count as u64 * spec.entry_size as u64;
        let audit_len = if spec.has_audit {
            u64::from(header.audit_count) * AUDIT_ENTRY_SIZE as u64
        } else {
            0
        };

        let (entries, table_len, payload_start, payload_end, audit_start) = match spec.placement {
            DirectoryPlacement::AfterHeader => {
                let dir_end = hs + dir_len;
                if dir_end > file_len {
                    return Err(PodError::SizeMismatch { expected: dir_end, actual: file_len });
                }
                let (dir_start, dir_end) = (hs as usize, dir_end as usize);
                let entries = decode_directory(tag, &bytes[dir_start..dir_end], count, &bytes[dir_end..])?;
                let table_len = path_table_extent(tag, &entries);
                let payload_start = dir_end as u64 + table_len as u64;
                let payload_end = file_len.checked_sub(audit_len).filter(|&e| e >= payload_start).ok_or(
                    PodError::SizeMismatch { expected: payload_start + audit_len, actual: file_len },
                )?;
                (entries, table_len, payload_start, payload_end, payload_end)
            }
            DirectoryPlacement::Indexed => {
                let index = u64::from(header.index_offset);
                let dir_end = index + dir_len;
                let table_end = dir_end + u64::from(header.size_index);
                let audit_end = table_end + audit_len;
                if index < hs || audit_end > file_len {
                    return Err(PodError::SizeMismatch { expected: audit_end.max(hs), actual: file_len });
                }
                let entries = decode_directory(
                    tag,
                    &bytes[index as usize..dir_end as usize],
                    count,
                    &bytes[dir_end as usize..table_end as usize],
                )?;
                if audit_end < file_len {
                    debug!(trailing = file_len - audit_end, "ignoring bytes after the index");
                }
                (entries, header.size_index as usize, hs, index, table_end)
            }
        };

        let mut audit = Vec::new();
        if audit_len > 0 {
            audit.try_reserve_exact(header.audit_count as usize)?;
            let start = audit_start as usize;
            let mut reader = Cursor::new(&bytes[start..start + audit_len as usize]);
            for _ in 0..header.audit_count {
                audit.push(AuditEntry::read(&mut reader)?);
            }
        }

        let accounting = PayloadAccounting::compute(&entries, payload_start, payload_end);
        accounting.verify()?;

        let computed_checksum = match spec.checksum_range {
            ChecksumRange::File { skip } => checksum(&bytes[skip.min(bytes.len())..]),
            ChecksumRange::Payload => checksum(&bytes[payload_start as usize..payload_end as usize]),
        };
        if spec.checksum_field.is_some() && header.checksum != computed_checksum {
            warn!(
                stored = format_args!("{:#010x}", header.checksum),
                computed = format_args!("{:#010x}", computed_checksum),
                "stored checksum is stale"
            );
        }

        bytes.truncate(payload_end as usize);
        Ok(Self {
            tag,
            header,
            buffer: bytes,
            entries,
            audit,
            accounting,
            path_table_len: table_len,
            computed_checksum,
        })
    }

    // ── Metadata ────────────────────────────────────────────────────────────

    pub fn format(&self) -> FormatTag { self.tag }
    pub fn header(&self) -> &Header { &self.header }
    pub fn header_mut(&mut self) -> &mut Header { &mut self.header }
    pub fn entries(&self) -> &[Entry] { &self.entries }
    pub fn audit_trail(&self) -> &[AuditEntry] { &self.audit }
    pub fn accounting(&self) -> &PayloadAccounting { &self.accounting }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Current in-memory size: header, any leading directory, and payload.
    pub fn size(&self) -> u64 { self.buffer.len() as u64 }

    /// Checksum computed at load time or by the last checksum/serialize.
    pub fn computed_checksum(&self) -> u32 { self.computed_checksum }

    /// Checksum recorded in the header, for formats that store one.
    pub fn stored_checksum(&self) -> Option<u32> {
        self.tag.spec().checksum_field.map(|_| self.header.checksum)
    }

    pub fn entry(&self, index: usize) -> PodResult<&Entry> {
        self.entries
            .get(index)
            .ok_or(PodError::IndexOutOfRange { index, count: self.entries.len() })
    }

    /// Index of the first entry named exactly `name`.
    pub fn find(&self, name: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Number of entries whose name contains `pattern`.
    pub fn count(&self, pattern: Option<&str>) -> usize {
        self.entries.iter().filter(|e| name_matches(&e.name, pattern)).count()
    }

    pub fn list(&self) -> Vec<EntryInfo> {
        self.entries.iter().enumerate().map(|(i, e)| EntryInfo::new(i, e)).collect()
    }

    /// Name the continuation volume (POD5, POD6).
    pub fn set_next_archive(&mut self, name: &[u8]) -> PodResult<()> {
        if !self.tag.spec().has_next_archive {
            return Err(PodError::FormatUnsupported(format!("{} has no next archive field", self.tag)));
        }
        self.header.set_next_archive(name)
    }

    // ── Entry payloads ──────────────────────────────────────────────────────

    /// Stored (possibly compressed) bytes of entry `index`.
    pub fn entry_bytes(&self, index: usize) -> PodResult<&[u8]> {
        let e = self.entry(index)?;
        let (lo, hi) = e.range();
        self.buffer
            .get(lo as usize..hi as usize)
            .ok_or(PodError::SizeMismatch { expected: hi, actual: self.buffer.len() as u64 })
    }

    /// Decoded payload of entry `index`.
    pub fn entry_data(&self, index: usize) -> PodResult<Vec<u8>> {
        let stored = self.entry_bytes(index)?;
        let e = &self.entries[index];
        Ok(decode_payload(stored, e.compression_level, e.uncompressed as usize)?)
    }

    /// CRC over the stored bytes of entry `index`.
    pub fn entry_checksum(&self, index: usize) -> PodResult<u32> {
        Ok(checksum(self.entry_bytes(index)?))
    }

    // ── Mutation ────────────────────────────────────────────────────────────

    /// Encode `data` for this archive without adding it.
    pub fn prepare(&self, name: &[u8], data: &[u8], meta: &EntryMetadata) -> PodResult<PreparedEntry> {
        let uncompressed = u32::try_from(data.len())
            .map_err(|_| PodError::TooLarge { size: data.len() as u64, limit: u64::from(u32::MAX) })?;
        let level = if self.tag.spec().has_compression {
            meta.compression.level_for(data.len())
        } else {
            0
        };
        let (stored, level) = encode_payload(data, level)?;
        Ok(PreparedEntry {
            name: name.to_vec(),
            checksum: checksum(&stored),
            stored,
            uncompressed,
            compression_level: level,
            timestamp: meta.timestamp,
        })
    }

    /// Append a new entry; returns its index.
    pub fn add_entry(&mut self, name: &[u8], data: &[u8], meta: &EntryMetadata) -> PodResult<usize> {
        let prepared = self.prepare(name, data, meta)?;
        self.add_prepared(prepared)
    }

    /// Append an already-encoded entry; returns its index.
    pub fn add_prepared(&mut self, prepared: PreparedEntry) -> PodResult<usize> {
        let spec = self.tag.spec();
        let PreparedEntry { mut name, stored, uncompressed, compression_level, timestamp, checksum } = prepared;

        if name.contains(&0) {
            return Err(PodError::InvalidName(String::from_utf8_lossy(&name).into_owned()));
        }

        if name.len() > spec.max_name_len {
            if spec.has_path_table() {
                return Err(PodError::NameTooLong {
                    name: String::from_utf8_lossy(&name).into_owned(),
                    max:  spec.max_name_len,
                });
            }
            warn!(
                name = %String::from_utf8_lossy(&name),
                max = spec.max_name_len,
                "entry name truncated"
            );
            name.truncate(spec.max_name_len);
        }

        let offset = self.buffer.len() as u64;
        let end = offset + stored.len() as u64;
        if end > u64::from(u32::MAX) {
            return Err(PodError::TooLarge { size: end, limit: u64::from(u32::MAX) });
        }
        self.buffer.try_reserve(stored.len())?;
        self.entries.try_reserve(1)?;
        self.buffer.extend_from_slice(&stored);

        let mut e = Entry::new(&name);
        e.offset = offset as u32;
        e.size = stored.len() as u32;
        e.timestamp = timestamp;
        e.checksum = checksum;
        if spec.has_compression {
            e.uncompressed = uncompressed;
            e.compression_level = compression_level;
        } else {
            e.uncompressed = e.size;
        }
        if spec.has_path_table() {
            e.path_offset = self.path_table_len as u32;
            self.path_table_len += name.len() + 1;
        }

        debug!(
            name = %e.display_name(),
            offset = e.offset,
            size = e.size,
            level = e.compression_level,
            "added entry"
        );
        self.entries.push(e);
        self.header.entry_count = self.entries.len() as u32;
        self.accounting.record_append(stored.len() as u64);
        Ok(self.entries.len() - 1)
    }

    /// Remove entry `index`; later entries shift down one slot.  The payload
    /// bytes stay in the buffer until the next relayout.
    pub fn delete_entry(&mut self, index: usize) -> PodResult<Entry> {
        if index >= self.entries.len() {
            return Err(PodError::IndexOutOfRange { index, count: self.entries.len() });
        }
        let removed = self.entries.remove(index);
        self.header.entry_count = self.entries.len() as u32;
        self.accounting.record_removal(u64::from(removed.size));
        debug!(index, name = %removed.display_name(), "deleted entry");
        Ok(removed)
    }

    /// Drop every entry and the audit trail, keeping the format.
    pub fn reset(&mut self) {
        *self = Archive::create_empty(self.tag);
    }

    // ── Extraction ──────────────────────────────────────────────────────────

    /// Write the decoded payload of entry `index` to `dest`.
    pub fn extract_entry<P: AsRef<Path>>(&self, index: usize, dest: P) -> PodResult<u64> {
        let data = self.entry_data(index)?;
        File::create(dest.as_ref())?.write_all(&data)?;
        Ok(data.len() as u64)
    }

    /// Extract every entry whose name contains `pattern` below `dest`,
    /// recreating its directories.  Stops at the first failure.
    pub fn extract_all<P: AsRef<Path>>(&self, pattern: Option<&str>, dest: P) -> PodResult<usize> {
        let dest = dest.as_ref();
        let mut extracted = 0;
        for (i, e) in self.entries.iter().enumerate() {
            if !name_matches(&e.name, pattern) {
                continue;
            }
            let target = safe_join(dest, &e.name)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let written = self.extract_entry(i, &target)?;
            debug!(name = %e.display_name(), bytes = written, "extracted");
            extracted += 1;
        }
        info!(count = extracted, dest = %dest.display(), "extraction finished");
        Ok(extracted)
    }

    // ── Serialization ───────────────────────────────────────────────────────

    /// Lay the archive out for writing and return the bytes that follow the
    /// buffer in the image (directory, path table, audit trail as the format
    /// places them).  Entry offsets and header index fields are rewritten.
    fn layout(&mut self) -> PodResult<Vec<u8>> {
        let spec = self.tag.spec();
        let hs = spec.header_size;
        self.header.entry_count = self.entries.len() as u32;
        if spec.has_audit {
            self.header.audit_count = self.audit.len() as u32;
        }

        let mut audit_bytes = Vec::new();
        audit_bytes.try_reserve_exact(self.audit.len() * AUDIT_ENTRY_SIZE)?;
        for a in &self.audit {
            a.write(&mut audit_bytes)?;
        }

        match spec.placement {
            DirectoryPlacement::AfterHeader => {
                let dir_len = self.entries.len() * spec.entry_size;
                let table_len: usize = if spec.has_path_table() {
                    self.entries.iter().map(|e| e.name.len() + 1).sum()
                } else {
                    0
                };
                let payload_start = hs + dir_len + table_len;
                let data_total: usize = self.entries.iter().map(|e| e.size as usize).sum();

                let mut image = Vec::new();
                image.try_reserve_exact(payload_start + data_total)?;
                image.resize(payload_start, 0);
                for e in self.entries.iter_mut() {
                    let (lo, hi) = e.range();
                    let bytes = self.buffer.get(lo as usize..hi as usize).ok_or(PodError::SizeMismatch {
                        expected: hi,
                        actual:   self.buffer.len() as u64,
                    })?;
                    e.offset = u32::try_from(image.len()).map_err(|_| PodError::TooLarge {
                        size:  image.len() as u64,
                        limit: u64::from(u32::MAX),
                    })?;
                    image.extend_from_slice(bytes);
                }
                let (dir, table) = encode_directory(self.tag, &mut self.entries)?;
                image[hs..hs + dir_len].copy_from_slice(&dir);
                image[hs + dir_len..payload_start].copy_from_slice(&table);

                self.buffer = image;
                self.path_table_len = table_len;
                self.accounting = PayloadAccounting::compute(
                    &self.entries,
                    payload_start as u64,
                    self.buffer.len() as u64,
                );
                Ok(audit_bytes)
            }
            DirectoryPlacement::Indexed => {
                let (mut tail, table) = encode_directory(self.tag, &mut self.entries)?;
                self.header.index_offset = u32::try_from(self.buffer.len()).map_err(|_| PodError::TooLarge {
                    size:  self.buffer.len() as u64,
                    limit: u64::from(u32::MAX),
                })?;
                self.header.size_index = table.len() as u32;
                self.path_table_len = table.len();
                tail.try_reserve_exact(table.len() + audit_bytes.len())?;
                tail.extend_from_slice(&table);
                tail.extend_from_slice(&audit_bytes);
                Ok(tail)
            }
        }
    }

    /// Patch the header into the buffer, compute the file checksum over the
    /// image `buffer ++ tail` and record it where the format stores one.
    fn seal(&mut self, tail: &[u8]) -> PodResult<u32> {
        let hs = self.tag.spec().header_size;
        self.buffer[..hs].copy_from_slice(&self.header.to_bytes()?);
        let crc = match self.tag.spec().checksum_range {
            ChecksumRange::File { skip } => checksum_parts([&self.buffer[skip..], tail]),
            ChecksumRange::Payload => {
                let (start, end) = (self.accounting.start as usize, self.buffer.len());
                checksum(&self.buffer[start..end])
            }
        };
        if self.tag.spec().checksum_field.is_some() {
            self.header.checksum = crc;
            self.buffer[..hs].copy_from_slice(&self.header.to_bytes()?);
        }
        self.computed_checksum = crc;
        Ok(crc)
    }

    /// Recompute the file-level checksum of the archive as it would be
    /// written now.
    pub fn checksum(&mut self) -> PodResult<u32> {
        let tail = self.layout()?;
        self.seal(&tail)
    }

    /// Encode the complete archive image.
    pub fn to_bytes(&mut self) -> PodResult<Vec<u8>> {
        let tail = self.layout()?;
        self.seal(&tail)?;
        let mut out = Vec::new();
        out.try_reserve_exact(self.buffer.len() + tail.len())?;
        out.extend_from_slice(&self.buffer);
        out.extend_from_slice(&tail);
        Ok(out)
    }

    /// Lay out, checksum and write the archive to `path`.
    pub fn serialize<P: AsRef<Path>>(&mut self, path: P) -> PodResult<u64> {
        let path = path.as_ref();
        let tail = self.layout()?;
        let crc = self.seal(&tail)?;
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&self.buffer)?;
        out.write_all(&tail)?;
        out.flush()?;
        let written = (self.buffer.len() + tail.len()) as u64;
        info!(
            path = %path.display(),
            format = %self.tag,
            entries = self.entries.len(),
            bytes = written,
            checksum = format_args!("{crc:#010x}"),
            "wrote archive"
        );
        Ok(written)
    }
}

// ── helpers ─────────────────────────────────────────────────────────────────

/// Case-sensitive substring match; `None` or an empty pattern matches all.
pub fn name_matches(name: &[u8], pattern: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(p) if p.is_empty() => true,
        Some(p) => name.windows(p.len()).any(|w| w == p.as_bytes()),
    }
}

/// Resolve an archive name (either separator) below `root`.
pub fn safe_join(root: &Path, name: &[u8]) -> PodResult<PathBuf> {
    let text = String::from_utf8_lossy(name);
    let mut out = root.to_path_buf();
    let mut depth = 0;
    for part in text.split(['\\', '/']) {
        match part {
            "" | "." => continue,
            ".." => return Err(PodError::UnsafePath(text.to_string())),
            _ => {}
        }
        if !matches!(Path::new(part).components().next(), Some(Component::Normal(_))) || part.contains(':') {
            return Err(PodError::UnsafePath(text.to_string()));
        }
        out.push(part);
        depth += 1;
    }
    if depth == 0 {
        return Err(PodError::UnsafePath(text.to_string()));
    }
    Ok(out)
}

fn read_file(path: &Path) -> PodResult<Vec<u8>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EntryMetadata {
        EntryMetadata::default().with_timestamp(1_234_567)
    }

    fn sample(tag: FormatTag) -> Archive {
        let mut ar = Archive::create_empty(tag);
        ar.add_entry(b"a.txt", b"hello", &meta()).unwrap();
        ar.add_entry(b"dir\\b.bin", &[1, 2, 3, 4], &meta()).unwrap();
        ar.add_entry(b"dir\\c.txt", b"third entry", &meta()).unwrap();
        ar
    }

    #[test]
    fn every_format_roundtrips_through_bytes() {
        for tag in FormatTag::ALL {
            let mut ar = sample(tag);
            let image = ar.to_bytes().unwrap();
            let mut back = Archive::from_bytes(image.clone(), None).unwrap();
            assert_eq!(back.format(), tag);
            assert_eq!(back.len(), 3);
            assert_eq!(back.entries()[1].name, b"dir\\b.bin");
            assert_eq!(back.entry_data(2).unwrap(), b"third entry");
            assert_eq!(back.to_bytes().unwrap(), image, "{tag}");
        }
    }

    #[test]
    fn stored_checksum_matches_after_write() {
        for tag in FormatTag::ALL {
            let mut ar = sample(tag);
            let image = ar.to_bytes().unwrap();
            let back = Archive::from_bytes(image, Some(tag)).unwrap();
            if let Some(stored) = back.stored_checksum() {
                assert_eq!(stored, back.computed_checksum(), "{tag}");
            }
        }
    }

    #[test]
    fn payload_checksum_covers_payload_only() {
        let mut ar = sample(FormatTag::Pod4);
        let crc = ar.checksum().unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"hello");
        payload.extend_from_slice(&[1, 2, 3, 4]);
        payload.extend_from_slice(b"third entry");
        assert_eq!(crc, checksum(&payload));
    }

    #[test]
    fn checksum_is_stable() {
        let mut ar = sample(FormatTag::Pod2);
        let first = ar.checksum().unwrap();
        assert_eq!(ar.checksum().unwrap(), first);
    }

    #[test]
    fn pod1_checksum_starts_after_entry_count() {
        let mut ar = sample(FormatTag::Pod1);
        let image = ar.to_bytes().unwrap();
        assert_eq!(ar.computed_checksum(), checksum(&image[8..]));
        let back = Archive::from_bytes(image, None).unwrap();
        assert_eq!(back.computed_checksum(), ar.computed_checksum());
    }

    #[test]
    fn entry_checksum_is_crc_of_stored_bytes() {
        let ar = sample(FormatTag::Pod3);
        assert_eq!(ar.entry_checksum(0).unwrap(), checksum(b"hello"));
        assert_eq!(ar.entries()[0].checksum, checksum(b"hello"));
    }

    #[test]
    fn expected_format_is_enforced() {
        let mut ar = sample(FormatTag::Pod1);
        let image = ar.to_bytes().unwrap();
        assert!(matches!(
            Archive::from_bytes(image, Some(FormatTag::Pod2)),
            Err(PodError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn unknown_magic_is_format_mismatch() {
        let image = b"ZIPPxxxxxxxxxxxxxxxxxxxxxxxx".to_vec();
        assert!(matches!(Archive::from_bytes(image, None), Err(PodError::FormatMismatch { .. })));
    }

    #[test]
    fn truncation_is_size_mismatch() {
        for tag in [FormatTag::Pod1, FormatTag::Pod2, FormatTag::Epd] {
            let mut image = sample(tag).to_bytes().unwrap();
            image.truncate(image.len() - 3);
            assert!(
                matches!(Archive::from_bytes(image, None), Err(PodError::SizeMismatch { .. })),
                "{tag}"
            );
        }
        for tag in [FormatTag::Pod3, FormatTag::Pod4, FormatTag::Pod5, FormatTag::Pod6] {
            let mut image = sample(tag).to_bytes().unwrap();
            image.truncate(image.len() - 3);
            assert!(
                matches!(Archive::from_bytes(image, None), Err(PodError::SizeMismatch { .. })),
                "{tag}"
            );
        }
    }

    #[test]
    fn corrupt_entry_size_is_size_mismatch() {
        let mut ar = sample(FormatTag::Pod1);
        let mut image = ar.to_bytes().unwrap();
        // POD1 entry 0 size lives after its 32-byte name.
        let at = FormatTag::Pod1.spec().header_size + 32;
        image[at..at + 4].copy_from_slice(&50u32.to_le_bytes());
        assert!(matches!(Archive::from_bytes(image, None), Err(PodError::SizeMismatch { .. })));
    }

    #[test]
    fn stale_checksum_is_not_fatal() {
        let mut image = sample(FormatTag::Pod3).to_bytes().unwrap();
        image[4] ^= 0xFF;
        let ar = Archive::from_bytes(image, None).unwrap();
        assert_ne!(ar.stored_checksum(), Some(ar.computed_checksum()));
    }

    #[test]
    fn delete_shifts_and_keeps_order() {
        let mut ar = sample(FormatTag::Pod3);
        let removed = ar.delete_entry(1).unwrap();
        assert_eq!(removed.name, b"dir\\b.bin");
        assert_eq!(ar.len(), 2);
        assert_eq!(ar.header().entry_count, 2);
        assert_eq!(ar.entries()[1].name, b"dir\\c.txt");
        assert_eq!(ar.accounting().data_total, 16);
        assert_eq!(ar.accounting().gap_total, 4);
        assert!(matches!(ar.delete_entry(2), Err(PodError::IndexOutOfRange { index: 2, count: 2 })));
    }

    #[test]
    fn deleted_bytes_become_a_gap_on_reopen() {
        let mut ar = sample(FormatTag::Pod4);
        ar.delete_entry(0).unwrap();
        let image = ar.to_bytes().unwrap();
        let back = Archive::from_bytes(image, None).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.accounting().gap_total, 5);
        assert_eq!(back.entry_data(0).unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn relayout_compacts_fixed_directory_formats() {
        let mut ar = sample(FormatTag::Epd);
        ar.delete_entry(0).unwrap();
        let image = ar.to_bytes().unwrap();
        let back = Archive::from_bytes(image, None).unwrap();
        assert_eq!(back.accounting().gap_total, 0);
        assert_eq!(back.entry_data(1).unwrap(), b"third entry");
    }

    #[test]
    fn compression_only_where_supported() {
        let data = b"compress me ".repeat(500);
        let m = meta().with_compression(CompressionPolicy::Level(9));
        let mut pod4 = Archive::create_empty(FormatTag::Pod4);
        let i = pod4.add_entry(b"big.txt", &data, &m).unwrap();
        let e = &pod4.entries()[i];
        assert!(e.is_compressed());
        assert!(e.uncompressed > e.size);
        assert_eq!(pod4.entry_data(i).unwrap(), data);

        let mut pod3 = Archive::create_empty(FormatTag::Pod3);
        let i = pod3.add_entry(b"big.txt", &data, &m).unwrap();
        assert_eq!(pod3.entries()[i].compression_level, 0);
        assert_eq!(pod3.entries()[i].size as usize, data.len());
    }

    #[test]
    fn index_errors() {
        let ar = sample(FormatTag::Pod2);
        assert!(matches!(ar.entry_data(3), Err(PodError::IndexOutOfRange { .. })));
        assert!(matches!(ar.entry_checksum(9), Err(PodError::IndexOutOfRange { .. })));
    }

    #[test]
    fn long_names() {
        let mut pod1 = Archive::create_empty(FormatTag::Pod1);
        let i = pod1.add_entry(&[b'a'; 40], b"x", &meta()).unwrap();
        assert_eq!(pod1.entries()[i].name.len(), 31);

        let mut pod2 = Archive::create_empty(FormatTag::Pod2);
        assert!(matches!(
            pod2.add_entry(&[b'a'; 300], b"x", &meta()),
            Err(PodError::NameTooLong { .. })
        ));
    }

    #[test]
    fn names_with_nul_are_rejected() {
        for tag in FormatTag::ALL {
            let mut ar = Archive::create_empty(tag);
            assert!(
                matches!(ar.add_entry(b"a\0b.txt", b"x", &meta()), Err(PodError::InvalidName(_))),
                "{tag}"
            );
            assert!(ar.is_empty());
            assert_eq!(ar.size(), tag.spec().header_size as u64);
            ar.add_entry(b"a.txt", b"x", &meta()).unwrap();
            let back = Archive::from_bytes(ar.to_bytes().unwrap(), Some(tag)).unwrap();
            assert_eq!(back.entries()[0].name, b"a.txt");
        }
    }

    #[test]
    fn path_offsets_grow_with_table() {
        let ar = sample(FormatTag::Pod2);
        let offsets: Vec<u32> = ar.entries().iter().map(|e| e.path_offset).collect();
        assert_eq!(offsets, [0, 6, 16]);
    }

    #[test]
    fn next_archive_only_on_chain_formats() {
        let mut ar = Archive::create_empty(FormatTag::Pod3);
        assert!(matches!(ar.set_next_archive(b"X.POD"), Err(PodError::FormatUnsupported(_))));
        let mut ar = Archive::create_empty(FormatTag::Pod6);
        ar.set_next_archive(b"X.POD").unwrap();
        assert_eq!(ar.header().next_archive_text(), b"X.POD");
    }

    #[test]
    fn pattern_matching() {
        assert!(name_matches(b"data\\foo.txt", Some("foo")));
        assert!(!name_matches(b"data\\Foo.txt", Some("foo")));
        assert!(name_matches(b"anything", None));
        assert!(name_matches(b"anything", Some("")));
        assert!(!name_matches(b"ab", Some("abc")));
    }

    #[test]
    fn safe_join_rules() {
        let root = Path::new("/tmp/out");
        assert_eq!(safe_join(root, b"a\\b/c.txt").unwrap(), root.join("a").join("b").join("c.txt"));
        assert_eq!(safe_join(root, b"\\lead.txt").unwrap(), root.join("lead.txt"));
        assert!(matches!(safe_join(root, b"..\\evil"), Err(PodError::UnsafePath(_))));
        assert!(matches!(safe_join(root, b"a/../../evil"), Err(PodError::UnsafePath(_))));
        assert!(matches!(safe_join(root, b"C:\\evil"), Err(PodError::UnsafePath(_))));
        assert!(matches!(safe_join(root, b"//"), Err(PodError::UnsafePath(_))));
    }

    #[test]
    fn reset_empties_archive() {
        let mut ar = sample(FormatTag::Pod5);
        ar.reset();
        assert!(ar.is_empty());
        assert_eq!(ar.format(), FormatTag::Pod5);
        assert_eq!(ar.size(), FormatTag::Pod5.spec().header_size as u64);
    }
}
