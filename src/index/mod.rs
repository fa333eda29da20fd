//! Directory and path-table codec, plus payload gap accounting.

use std::io::Cursor;

use crate::entry::Entry;
use crate::error::{PodError, PodResult};
use crate::format::FormatTag;

// ── Path table ──────────────────────────────────────────────────────────────

/// Contiguous NUL-terminated names addressed by byte offset.
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    bytes: Vec<u8>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` and return its offset.  Duplicates are stored again.
    pub fn push(&mut self, name: &[u8]) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name);
        self.bytes.push(0);
        offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Name stored at `offset` in `table`, without its terminator.
/// `None` when the offset is out of range or the name is unterminated.
pub fn name_at(table: &[u8], offset: u32) -> Option<&[u8]> {
    let tail = table.get(offset as usize..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(&tail[..end])
}

// ── Directory ───────────────────────────────────────────────────────────────

/// Decode `count` records from `bytes`.  Names are resolved from `table`
/// for path-table formats.
pub fn decode_directory(
    tag:   FormatTag,
    bytes: &[u8],
    count: usize,
    table: &[u8],
) -> PodResult<Vec<Entry>> {
    let spec = tag.spec();
    let needed = count as u64 * spec.entry_size as u64;
    if (bytes.len() as u64) < needed {
        return Err(PodError::SizeMismatch { expected: needed, actual: bytes.len() as u64 });
    }
    let mut entries = Vec::new();
    entries.try_reserve_exact(count)?;
    let mut reader = Cursor::new(bytes);
    for _ in 0..count {
        let mut e = Entry::read(tag, &mut reader)?;
        if spec.has_path_table() {
            e.name = name_at(table, e.path_offset)
                .ok_or(PodError::SizeMismatch {
                    expected: table.len() as u64,
                    actual:   u64::from(e.path_offset),
                })?
                .to_vec();
        }
        entries.push(e);
    }
    Ok(entries)
}

/// Length of a POD2-style path table that ends where its furthest name does.
pub fn path_table_extent(tag: FormatTag, entries: &[Entry]) -> usize {
    if !tag.spec().has_path_table() {
        return 0;
    }
    entries
        .iter()
        .map(|e| e.path_offset as usize + e.name.len() + 1)
        .max()
        .unwrap_or(0)
}

/// Encode the directory and a fresh path table in directory order,
/// rewriting every entry's `path_offset` to its new location.
pub fn encode_directory(tag: FormatTag, entries: &mut [Entry]) -> PodResult<(Vec<u8>, Vec<u8>)> {
    let spec = tag.spec();
    let mut dir = Vec::new();
    dir.try_reserve_exact(entries.len() * spec.entry_size)?;
    let mut table = PathTable::new();
    for e in entries.iter_mut() {
        if spec.has_path_table() {
            e.path_offset = table.push(&e.name);
        }
        e.write(tag, &mut dir)?;
    }
    Ok((dir, table.into_bytes()))
}

// ── Gap accounting ──────────────────────────────────────────────────────────

/// Payload bookkeeping established at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadAccounting {
    /// First byte of the payload region.
    pub start:      u64,
    /// One past the last byte of the payload region.
    pub end:        u64,
    pub data_total: u64,
    pub gap_total:  u64,
    /// Entry with the lowest offset (first seen on ties).
    pub lowest:     Option<usize>,
    /// Entry with the highest offset (first seen on ties).
    pub highest:    Option<usize>,
}

impl PayloadAccounting {
    pub fn region_size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Account for `entries` within `[start, end)`.
    ///
    /// Gaps before, between and after the entries are counted once.  The
    /// directory order is left alone; only a private by-offset view is sorted.
    pub fn compute(entries: &[Entry], start: u64, end: u64) -> Self {
        let mut acct = PayloadAccounting { start, end, ..Default::default() };

        for (i, e) in entries.iter().enumerate() {
            acct.data_total += u64::from(e.size);
            match acct.lowest {
                Some(lo) if entries[lo].offset <= e.offset => {}
                _ => acct.lowest = Some(i),
            }
            match acct.highest {
                Some(hi) if entries[hi].offset >= e.offset => {}
                _ => acct.highest = Some(i),
            }
        }

        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| (entries[i].offset, entries[i].size));

        let mut cursor = start;
        for i in order {
            let (lo, hi) = entries[i].range();
            if lo > cursor {
                acct.gap_total += lo - cursor;
            }
            cursor = cursor.max(hi);
        }
        if end > cursor {
            acct.gap_total += end - cursor;
        }
        acct
    }

    /// Fail with `SizeMismatch` unless data and gaps exactly fill the region.
    /// Overlapping or out-of-region entries always fail.
    pub fn verify(&self) -> PodResult<()> {
        let actual = self.data_total + self.gap_total;
        if actual != self.region_size() || self.start > self.end {
            return Err(PodError::SizeMismatch { expected: self.region_size(), actual });
        }
        Ok(())
    }

    /// Book an appended payload of `size` bytes.
    pub fn record_append(&mut self, size: u64) {
        self.data_total += size;
        self.end += size;
    }

    /// Book a removed entry; its bytes stay in the buffer as a gap.
    pub fn record_removal(&mut self, size: u64) {
        self.data_total = self.data_total.saturating_sub(size);
        self.gap_total += size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u32, size: u32) -> Entry {
        let mut e = Entry::new(b"x");
        e.offset = offset;
        e.size = size;
        e
    }

    #[test]
    fn path_table_keeps_duplicates() {
        let mut t = PathTable::new();
        assert_eq!(t.push(b"a.txt"), 0);
        assert_eq!(t.push(b"a.txt"), 6);
        let bytes = t.into_bytes();
        assert_eq!(name_at(&bytes, 0), Some(&b"a.txt"[..]));
        assert_eq!(name_at(&bytes, 6), Some(&b"a.txt"[..]));
        assert_eq!(name_at(&bytes, 3), Some(&b"txt"[..]));
        assert_eq!(name_at(&bytes, 99), None);
    }

    #[test]
    fn unterminated_name_is_rejected() {
        assert_eq!(name_at(b"abc", 0), None);
    }

    #[test]
    fn contiguous_entries_in_any_order() {
        let entries = [entry(30, 10), entry(10, 20), entry(40, 5)];
        let acct = PayloadAccounting::compute(&entries, 10, 45);
        assert_eq!(acct.data_total, 35);
        assert_eq!(acct.gap_total, 0);
        assert_eq!(acct.lowest, Some(1));
        assert_eq!(acct.highest, Some(2));
        acct.verify().unwrap();
    }

    #[test]
    fn gaps_are_counted_everywhere() {
        let entries = [entry(14, 4), entry(24, 6)];
        let acct = PayloadAccounting::compute(&entries, 10, 40);
        // 4 before, 6 between, 10 after
        assert_eq!(acct.gap_total, 20);
        acct.verify().unwrap();
    }

    #[test]
    fn ties_keep_first_seen() {
        let entries = [entry(10, 0), entry(10, 5), entry(15, 0), entry(15, 0)];
        let acct = PayloadAccounting::compute(&entries, 10, 15);
        assert_eq!(acct.lowest, Some(0));
        assert_eq!(acct.highest, Some(2));
        acct.verify().unwrap();
    }

    #[test]
    fn overlap_is_size_mismatch() {
        let entries = [entry(10, 10), entry(15, 10)];
        let acct = PayloadAccounting::compute(&entries, 10, 25);
        assert!(matches!(acct.verify(), Err(PodError::SizeMismatch { .. })));
    }

    #[test]
    fn entry_past_end_is_size_mismatch() {
        let entries = [entry(10, 100)];
        let acct = PayloadAccounting::compute(&entries, 10, 50);
        assert!(matches!(acct.verify(), Err(PodError::SizeMismatch { expected: 40, actual: 100 })));
    }

    #[test]
    fn entry_before_start_is_size_mismatch() {
        let entries = [entry(0, 8), entry(8, 2)];
        let acct = PayloadAccounting::compute(&entries, 8, 10);
        assert!(acct.verify().is_err());
    }

    #[test]
    fn directory_encode_rewrites_path_offsets() {
        let mut entries = vec![Entry::new(b"b"), Entry::new(b"long\\name"), Entry::new(b"b")];
        entries[1].path_offset = 999;
        let (dir, table) = encode_directory(FormatTag::Pod3, &mut entries).unwrap();
        assert_eq!(dir.len(), 3 * 20);
        assert_eq!(table, b"b\0long\\name\0b\0");
        assert_eq!(entries[1].path_offset, 2);
        assert_eq!(entries[2].path_offset, 12);
        let back = decode_directory(FormatTag::Pod3, &dir, 3, &table).unwrap();
        assert_eq!(back, entries);
        assert_eq!(path_table_extent(FormatTag::Pod3, &back), table.len());
    }

    #[test]
    fn short_directory_is_size_mismatch() {
        assert!(matches!(
            decode_directory(FormatTag::Pod1, &[0u8; 39], 1, &[]),
            Err(PodError::SizeMismatch { .. })
        ));
    }
}
