//! Diagnostic dump of an archive: entries, audit trail and a header summary.

use std::io::{self, Write};

use chrono::DateTime;

use crate::archive::{name_matches, Archive};
use crate::codec::CodecId;
use crate::error::PodResult;
use crate::format::{describe, FormatTag};
use crate::index::PayloadAccounting;

/// Render a UNIX timestamp as UTC; zero renders as `-`.
pub fn format_timestamp(ts: u32) -> String {
    if ts == 0 {
        return "-".to_owned();
    }
    DateTime::from_timestamp(i64::from(ts), 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// CRC cell of the entry table and its flag.  A recorded CRC that differs is
/// flagged with `!`; an unreadable payload range shows as dashes.
fn crc_column(computed: PodResult<u32>, recorded: Option<u32>) -> (String, &'static str) {
    match (computed, recorded) {
        (Ok(crc), Some(rec)) if rec != 0 && rec != crc => (format!("{crc:#010x}"), "!"),
        (Ok(crc), _) => (format!("{crc:#010x}"), " "),
        (Err(_), _) => ("-".repeat(10), "!"),
    }
}

/// Write the report for entries whose name contains `pattern`.
pub fn print<W: Write>(ar: &Archive, pattern: Option<&str>, mut out: W) -> io::Result<()> {
    let tag = ar.format();
    let spec = tag.spec();

    // ── Entries ─────────────────────────────────────────────────────────────
    writeln!(
        out,
        "{:>5} {:>10} {:>10} {:>10} {:>7} {:>10} {:>19}  Name",
        "#", "Offset", "Size", "Unpacked", "Codec", "CRC", "Timestamp"
    )?;
    for (i, e) in ar.entries().iter().enumerate() {
        if !name_matches(&e.name, pattern) {
            continue;
        }
        let recorded = spec.checksum_field.map(|_| e.checksum);
        let (crc, flag) = crc_column(ar.entry_checksum(i), recorded);
        writeln!(
            out,
            "{:>5} {:#010x} {:>10} {:>10} {:>7} {:>10}{} {:>19}  {}",
            i,
            e.offset,
            e.size,
            e.uncompressed,
            CodecId::from_level(e.compression_level).name(),
            crc,
            flag,
            format_timestamp(e.timestamp),
            e.display_name(),
        )?;
    }

    // ── Audit trail ─────────────────────────────────────────────────────────
    if !ar.audit_trail().is_empty() {
        writeln!(out, "\nAudit trail:")?;
        for a in ar.audit_trail() {
            let action = a.action().map(|x| x.name()).unwrap_or("?");
            writeln!(
                out,
                "  {:<16} {:>19} {:<6} {} ({} -> {} bytes, {} -> {}) crc {:#010x}",
                text(a.user_text()),
                format_timestamp(a.timestamp),
                action,
                text(a.path_text()),
                a.old_size,
                a.new_size,
                format_timestamp(a.old_timestamp),
                format_timestamp(a.new_timestamp),
                a.checksum()?,
            )?;
        }
    }

    // ── Summary ─────────────────────────────────────────────────────────────
    let h = ar.header();
    let acct = ar.accounting();
    writeln!(out, "\nSummary:")?;
    writeln!(out, "  format             : {} ({})", tag, describe(tag))?;
    writeln!(out, "  comment            : {}", text(h.comment_text()))?;
    writeln!(out, "  entries            : {}", h.entry_count)?;
    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        writeln!(out, "  matching '{}'{:<6}: {}", pattern, "", ar.count(Some(pattern)))?;
    }
    match ar.stored_checksum() {
        Some(stored) => {
            let state = if stored == ar.computed_checksum() { "ok" } else { "MISMATCH" };
            writeln!(
                out,
                "  checksum           : {:#010x} stored / {:#010x} computed ({})",
                stored,
                ar.computed_checksum(),
                state
            )?;
        }
        None => writeln!(out, "  checksum           : {:#010x} computed", ar.computed_checksum())?,
    }
    if spec.has_audit {
        writeln!(out, "  audit entries      : {}", h.audit_count)?;
    }
    match tag {
        FormatTag::Pod3 | FormatTag::Pod4 | FormatTag::Pod5 => {
            writeln!(out, "  revision           : {}", h.revision)?;
            writeln!(out, "  priority           : {}", h.priority)?;
            writeln!(out, "  author             : {}", text(h.author_text()))?;
            writeln!(out, "  copyright          : {}", text(h.copyright_text()))?;
            writeln!(out, "  index offset       : {:#010x}", h.index_offset)?;
            writeln!(out, "  size index         : {:#010x}", h.size_index)?;
            let words: Vec<String> = h.reserved.iter().map(|w| format!("{w:#010x}")).collect();
            writeln!(out, "  reserved           : {}", words.join(" "))?;
        }
        FormatTag::Pod6 => {
            writeln!(out, "  version            : {}", h.version)?;
            writeln!(out, "  index offset       : {:#010x}", h.index_offset)?;
            writeln!(out, "  size index         : {:#010x}", h.size_index)?;
        }
        FormatTag::Epd => writeln!(out, "  version            : {}", h.version)?,
        FormatTag::Pod1 | FormatTag::Pod2 => {}
    }
    if spec.has_next_archive {
        let next = text(h.next_archive_text());
        writeln!(out, "  next archive       : {}", if next.is_empty() { "-" } else { next.as_str() })?;
    }
    writeln!(out, "  payload region     : {:#010x}..{:#010x}", acct.start, acct.end)?;
    writeln!(out, "  entry data         : {} bytes", acct.data_total)?;
    writeln!(out, "  gaps               : {} bytes", acct.gap_total)?;
    if pattern.is_some_and(|p| !p.is_empty()) {
        return Ok(());
    }
    // Indices shift on delete, so find the extremes against the current directory.
    let entries = ar.entries();
    let bounds = PayloadAccounting::compute(entries, acct.start, acct.end);
    if let (Some(lo), Some(hi)) = (bounds.lowest, bounds.highest) {
        writeln!(out, "  lowest entry       : {:#010x} {}", entries[lo].offset, entries[lo].display_name())?;
        writeln!(out, "  highest entry      : {:#010x} {}", entries[hi].offset, entries[hi].display_name())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::EntryMetadata;

    fn render(ar: &Archive, pattern: Option<&str>) -> String {
        let mut out = Vec::new();
        print(ar, pattern, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn lists_matching_entries_only() {
        let mut ar = Archive::create_empty(FormatTag::Pod3);
        let meta = EntryMetadata::default();
        ar.add_entry(b"art\\sky.tga", b"sky", &meta).unwrap();
        ar.add_entry(b"snd\\boom.wav", b"boom", &meta).unwrap();
        let all = render(&ar, None);
        assert!(all.contains("art\\sky.tga"));
        assert!(all.contains("snd\\boom.wav"));
        let some = render(&ar, Some("snd"));
        assert!(!some.contains("sky.tga"));
        assert!(some.contains("boom.wav"));
        assert!(some.contains("POD3"));
    }

    #[test]
    fn deleted_entry_disappears() {
        let mut ar = Archive::create_empty(FormatTag::Epd);
        let meta = EntryMetadata::default();
        ar.add_entry(b"keep.txt", b"1", &meta).unwrap();
        ar.add_entry(b"gone.txt", b"2", &meta).unwrap();
        ar.delete_entry(1).unwrap();
        let out = render(&ar, None);
        assert!(out.contains("keep.txt"));
        assert!(!out.contains("gone.txt"));
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0), "-");
        assert_eq!(format_timestamp(86_400), "1970-01-02 00:00:00");
    }

    #[test]
    fn crc_column_marks_unreadable_ranges() {
        assert_eq!(crc_column(Ok(0xAB), None), ("0x000000ab".to_string(), " "));
        assert_eq!(crc_column(Ok(0xAB), Some(0xCD)).1, "!");
        assert_eq!(crc_column(Ok(0xAB), Some(0)).1, " ");
        let bad = crc_column(Err(crate::error::PodError::SizeMismatch { expected: 10, actual: 4 }), Some(0xAB));
        assert_eq!(bad, ("----------".to_string(), "!"));
    }
}
