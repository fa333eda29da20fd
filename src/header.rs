//! Archive headers.
//!
//! One [`Header`] struct carries the union of every format's fields; the
//! per-format layout decides which of them are read and written.  Text fields
//! are kept at their full on-disk width so bytes after the terminator survive
//! a round-trip, and the POD3–POD5 reserved words are carried through opaquely.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PodError, PodResult};
use crate::format::{
    FormatTag, AUTHOR_SIZE, COMMENT_SIZE, EPD_COMMENT_SIZE, NEXT_ARCHIVE_SIZE,
};

/// Reserved words written into a fresh POD3/POD4/POD5 header.
pub const DEFAULT_RESERVED: [u32; 6] = [0x10c, 0, 0, 0xFFFF_FFFF, 0x120, 0x124];
/// Initial `size_index` of a fresh POD3/POD4/POD5 header.
pub const DEFAULT_SIZE_INDEX: u32 = 0x110;

// ── Fixed-width text fields ─────────────────────────────────────────────────

pub(crate) fn read_fixed<R: Read>(reader: &mut R, width: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; width];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Text stored in a NUL-padded field, up to the first terminator.
pub fn field_text(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Overwrite `field` with `value`, zero padded.  At most `width - 1` bytes
/// are kept so a terminator always fits; returns `false` when truncated.
pub fn set_field_text(field: &mut [u8], value: &[u8]) -> bool {
    let keep = value.len().min(field.len().saturating_sub(1));
    field.fill(0);
    field[..keep].copy_from_slice(&value[..keep]);
    keep == value.len()
}

/// Write `field` as exactly `width` bytes, zero padded or cut short.
pub(crate) fn write_field<W: Write>(writer: &mut W, field: &[u8], width: usize) -> io::Result<()> {
    let keep = field.len().min(width);
    writer.write_all(&field[..keep])?;
    writer.write_all(&vec![0u8; width - keep])
}

// ── Header ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    tag:              FormatTag,
    pub checksum:     u32,
    pub comment:      Vec<u8>,
    pub entry_count:  u32,
    pub audit_count:  u32,
    pub revision:     u32,
    pub priority:     u32,
    pub author:       Vec<u8>,
    pub copyright:    Vec<u8>,
    pub version:      u32,
    pub index_offset: u32,
    pub size_index:   u32,
    /// POD3–POD5 words of unknown meaning, in on-disk order
    /// (0x10c, 0x114, 0x118, 0x11c, 0x120, 0x124).
    pub reserved:     [u32; 6],
    pub next_archive: Vec<u8>,
}

impl Header {
    /// Zero-entry header with the defaults a fresh archive carries.
    pub fn new(tag: FormatTag) -> Self {
        let comment_width = if tag == FormatTag::Epd { EPD_COMMENT_SIZE } else { COMMENT_SIZE };
        let mut header = Self {
            tag,
            checksum:     0,
            comment:      vec![0u8; comment_width],
            entry_count:  0,
            audit_count:  0,
            revision:     0,
            priority:     0,
            author:       vec![0u8; AUTHOR_SIZE],
            copyright:    vec![0u8; AUTHOR_SIZE],
            version:      0,
            index_offset: 0,
            size_index:   0,
            reserved:     [0; 6],
            next_archive: vec![0u8; NEXT_ARCHIVE_SIZE],
        };
        match tag {
            FormatTag::Pod3 | FormatTag::Pod4 | FormatTag::Pod5 => {
                header.index_offset = tag.spec().header_size as u32;
                header.size_index   = DEFAULT_SIZE_INDEX;
                header.reserved     = DEFAULT_RESERVED;
            }
            FormatTag::Pod6 => {
                header.index_offset = tag.spec().header_size as u32;
            }
            _ => {}
        }
        header
    }

    pub fn tag(&self) -> FormatTag { self.tag }

    pub fn comment_text(&self) -> &[u8] { field_text(&self.comment) }
    pub fn author_text(&self) -> &[u8] { field_text(&self.author) }
    pub fn copyright_text(&self) -> &[u8] { field_text(&self.copyright) }
    pub fn next_archive_text(&self) -> &[u8] { field_text(&self.next_archive) }

    pub fn set_comment(&mut self, value: &[u8]) -> bool { set_field_text(&mut self.comment, value) }
    pub fn set_author(&mut self, value: &[u8]) -> bool { set_field_text(&mut self.author, value) }
    pub fn set_copyright(&mut self, value: &[u8]) -> bool { set_field_text(&mut self.copyright, value) }

    /// Set the continuation volume name; it must fit with its terminator.
    pub fn set_next_archive(&mut self, name: &[u8]) -> PodResult<()> {
        if name.len() >= NEXT_ARCHIVE_SIZE {
            return Err(PodError::NameTooLong {
                name: String::from_utf8_lossy(name).into_owned(),
                max:  NEXT_ARCHIVE_SIZE - 1,
            });
        }
        set_field_text(&mut self.next_archive, name);
        Ok(())
    }

    /// Encode the header.  Text fields are padded or cut to their on-disk
    /// width, so the output is always `header_size` bytes.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let w = &mut writer;
        w.write_all(self.tag.magic())?;
        match self.tag {
            FormatTag::Pod1 => {
                w.write_u32::<LittleEndian>(self.entry_count)?;
                write_field(w, &self.comment, COMMENT_SIZE)?;
            }
            FormatTag::Pod2 => {
                w.write_u32::<LittleEndian>(self.checksum)?;
                write_field(w, &self.comment, COMMENT_SIZE)?;
                w.write_u32::<LittleEndian>(self.entry_count)?;
                w.write_u32::<LittleEndian>(self.audit_count)?;
            }
            FormatTag::Pod3 | FormatTag::Pod4 | FormatTag::Pod5 => {
                w.write_u32::<LittleEndian>(self.checksum)?;
                write_field(w, &self.comment, COMMENT_SIZE)?;
                w.write_u32::<LittleEndian>(self.entry_count)?;
                w.write_u32::<LittleEndian>(self.audit_count)?;
                w.write_u32::<LittleEndian>(self.revision)?;
                w.write_u32::<LittleEndian>(self.priority)?;
                write_field(w, &self.author, AUTHOR_SIZE)?;
                write_field(w, &self.copyright, AUTHOR_SIZE)?;
                w.write_u32::<LittleEndian>(self.index_offset)?;
                w.write_u32::<LittleEndian>(self.reserved[0])?;
                w.write_u32::<LittleEndian>(self.size_index)?;
                for word in &self.reserved[1..] {
                    w.write_u32::<LittleEndian>(*word)?;
                }
                if self.tag == FormatTag::Pod5 {
                    write_field(w, &self.next_archive, NEXT_ARCHIVE_SIZE)?;
                }
            }
            FormatTag::Pod6 => {
                w.write_u32::<LittleEndian>(self.entry_count)?;
                w.write_u32::<LittleEndian>(self.version)?;
                w.write_u32::<LittleEndian>(self.index_offset)?;
                w.write_u32::<LittleEndian>(self.size_index)?;
                write_field(w, &self.comment, COMMENT_SIZE)?;
                write_field(w, &self.next_archive, NEXT_ARCHIVE_SIZE)?;
            }
            FormatTag::Epd => {
                write_field(w, &self.comment, EPD_COMMENT_SIZE)?;
                w.write_u32::<LittleEndian>(self.entry_count)?;
                w.write_u32::<LittleEndian>(self.version)?;
                w.write_u32::<LittleEndian>(self.checksum)?;
            }
        }
        Ok(())
    }

    /// Encoded header, exactly `header_size` bytes long.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.tag.spec().header_size);
        self.write(&mut out)?;
        Ok(out)
    }

    /// Parse the header of a `tag` archive from the start of `bytes`.
    pub fn read(tag: FormatTag, bytes: &[u8]) -> PodResult<Self> {
        let magic = bytes.get(..4).unwrap_or(bytes);
        if magic != tag.magic() {
            return Err(PodError::mismatch(tag.to_string(), magic));
        }
        let mut reader = Cursor::new(&bytes[4..]);
        let mut h = Header::new(tag);
        h.reserved = [0; 6];
        h.size_index = 0;
        h.index_offset = 0;
        match tag {
            FormatTag::Pod1 => {
                h.entry_count = reader.read_u32::<LittleEndian>()?;
                h.comment     = read_fixed(&mut reader, COMMENT_SIZE)?;
            }
            FormatTag::Pod2 => {
                h.checksum    = reader.read_u32::<LittleEndian>()?;
                h.comment     = read_fixed(&mut reader, COMMENT_SIZE)?;
                h.entry_count = reader.read_u32::<LittleEndian>()?;
                h.audit_count = reader.read_u32::<LittleEndian>()?;
            }
            FormatTag::Pod3 | FormatTag::Pod4 | FormatTag::Pod5 => {
                h.checksum     = reader.read_u32::<LittleEndian>()?;
                h.comment      = read_fixed(&mut reader, COMMENT_SIZE)?;
                h.entry_count  = reader.read_u32::<LittleEndian>()?;
                h.audit_count  = reader.read_u32::<LittleEndian>()?;
                h.revision     = reader.read_u32::<LittleEndian>()?;
                h.priority     = reader.read_u32::<LittleEndian>()?;
                h.author       = read_fixed(&mut reader, AUTHOR_SIZE)?;
                h.copyright    = read_fixed(&mut reader, AUTHOR_SIZE)?;
                h.index_offset = reader.read_u32::<LittleEndian>()?;
                h.reserved[0]  = reader.read_u32::<LittleEndian>()?;
                h.size_index   = reader.read_u32::<LittleEndian>()?;
                for word in &mut h.reserved[1..] {
                    *word = reader.read_u32::<LittleEndian>()?;
                }
                if tag == FormatTag::Pod5 {
                    h.next_archive = read_fixed(&mut reader, NEXT_ARCHIVE_SIZE)?;
                }
            }
            FormatTag::Pod6 => {
                h.entry_count  = reader.read_u32::<LittleEndian>()?;
                h.version      = reader.read_u32::<LittleEndian>()?;
                h.index_offset = reader.read_u32::<LittleEndian>()?;
                h.size_index   = reader.read_u32::<LittleEndian>()?;
                h.comment      = read_fixed(&mut reader, COMMENT_SIZE)?;
                h.next_archive = read_fixed(&mut reader, NEXT_ARCHIVE_SIZE)?;
            }
            FormatTag::Epd => {
                h.comment     = read_fixed(&mut reader, EPD_COMMENT_SIZE)?;
                h.entry_count = reader.read_u32::<LittleEndian>()?;
                h.version     = reader.read_u32::<LittleEndian>()?;
                h.checksum    = reader.read_u32::<LittleEndian>()?;
            }
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_matches_registry() {
        for tag in FormatTag::ALL {
            assert_eq!(Header::new(tag).to_bytes().unwrap().len(), tag.spec().header_size, "{tag}");
        }
    }

    #[test]
    fn reserved_words_survive_roundtrip() {
        let mut h = Header::new(FormatTag::Pod4);
        h.reserved = [1, 2, 3, 0xDEAD_BEEF, 5, 6];
        h.revision = 7;
        h.set_comment(b"levels");
        let bytes = h.to_bytes().unwrap();
        let back = Header::read(FormatTag::Pod4, &bytes).unwrap();
        assert_eq!(back, h);
        assert_eq!(&bytes[0x10c..0x110], &1u32.to_le_bytes());
        assert_eq!(&bytes[0x11c..0x120], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn text_after_terminator_is_preserved() {
        let mut bytes = Header::new(FormatTag::Pod1).to_bytes().unwrap();
        bytes[8..13].copy_from_slice(b"ab\0cd");
        let h = Header::read(FormatTag::Pod1, &bytes).unwrap();
        assert_eq!(h.comment_text(), b"ab");
        assert_eq!(h.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn wrong_magic_is_format_mismatch() {
        let bytes = Header::new(FormatTag::Pod2).to_bytes().unwrap();
        assert!(matches!(
            Header::read(FormatTag::Pod3, &bytes),
            Err(PodError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn truncated_header_is_io_error() {
        let bytes = Header::new(FormatTag::Pod3).to_bytes().unwrap();
        assert!(matches!(Header::read(FormatTag::Pod3, &bytes[..40]), Err(PodError::Io(_))));
    }

    #[test]
    fn comment_is_truncated_to_fit_terminator() {
        let mut h = Header::new(FormatTag::Pod2);
        assert!(!h.set_comment(&[b'x'; 100]));
        assert_eq!(h.comment_text().len(), COMMENT_SIZE - 1);
    }

    #[test]
    fn next_archive_must_fit() {
        let mut h = Header::new(FormatTag::Pod5);
        h.set_next_archive(b"DATA01.POD").unwrap();
        assert_eq!(h.next_archive_text(), b"DATA01.POD");
        assert!(matches!(
            h.set_next_archive(&[b'a'; NEXT_ARCHIVE_SIZE]),
            Err(PodError::NameTooLong { .. })
        ));
    }

    #[test]
    fn fresh_pod3_defaults() {
        let h = Header::new(FormatTag::Pod3);
        assert_eq!(h.index_offset, 0x128);
        assert_eq!(h.size_index, DEFAULT_SIZE_INDEX);
        assert_eq!(h.reserved, DEFAULT_RESERVED);
    }

    #[test]
    fn assigned_text_fields_keep_their_width() {
        for tag in FormatTag::ALL {
            let mut h = Header::new(tag);
            h.comment = b"my levels".to_vec();
            h.author = vec![b'a'; 300];
            h.next_archive = b"NEXT.POD".to_vec();
            let bytes = h.to_bytes().unwrap();
            assert_eq!(bytes.len(), tag.spec().header_size, "{tag}");
            let back = Header::read(tag, &bytes).unwrap();
            assert_eq!(back.comment_text(), b"my levels", "{tag}");
        }
    }
}
