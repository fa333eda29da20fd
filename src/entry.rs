//! Directory records and audit-trail records.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::checksum::checksum;
use crate::format::FormatTag;
use crate::header::{field_text, read_fixed, set_field_text, write_field};

// ── Entry ───────────────────────────────────────────────────────────────────

/// One directory record.
///
/// `name` is the resolved file name without terminator, taken from the fixed
/// field (POD1, EPD) or the path table (others).  Fields a format does not
/// store are synthesised on read: `uncompressed == size` and
/// `compression_level == 0` for uncompressed formats, zero timestamp and
/// checksum where absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name:              Vec<u8>,
    pub path_offset:       u32,
    pub size:              u32,
    pub offset:            u32,
    pub uncompressed:      u32,
    pub compression_level: u32,
    pub timestamp:         u32,
    pub checksum:          u32,
    /// POD6 trailing word, carried through unchanged.
    pub reserved:          u32,
}

impl Entry {
    pub fn new(name: &[u8]) -> Self {
        Self {
            name:              name.to_vec(),
            path_offset:       0,
            size:              0,
            offset:            0,
            uncompressed:      0,
            compression_level: 0,
            timestamp:         0,
            checksum:          0,
            reserved:          0,
        }
    }

    /// Lossy UTF-8 rendering of the name.
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compression_level > 0
    }

    /// Byte range `[offset, offset + size)` as `u64`s.
    #[inline]
    pub fn range(&self) -> (u64, u64) {
        let start = u64::from(self.offset);
        (start, start + u64::from(self.size))
    }

    pub fn write<W: Write>(&self, tag: FormatTag, mut writer: W) -> io::Result<()> {
        let spec = tag.spec();
        if spec.name_width > 0 {
            let mut field = vec![0u8; spec.name_width];
            set_field_text(&mut field, &self.name);
            writer.write_all(&field)?;
        } else {
            writer.write_u32::<LittleEndian>(self.path_offset)?;
        }
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        match tag {
            FormatTag::Pod1 => {}
            FormatTag::Pod2 | FormatTag::Pod3 | FormatTag::Epd => {
                writer.write_u32::<LittleEndian>(self.timestamp)?;
                writer.write_u32::<LittleEndian>(self.checksum)?;
            }
            FormatTag::Pod4 | FormatTag::Pod5 => {
                writer.write_u32::<LittleEndian>(self.uncompressed)?;
                writer.write_u32::<LittleEndian>(self.compression_level)?;
                writer.write_u32::<LittleEndian>(self.timestamp)?;
                writer.write_u32::<LittleEndian>(self.checksum)?;
            }
            FormatTag::Pod6 => {
                writer.write_u32::<LittleEndian>(self.uncompressed)?;
                writer.write_u32::<LittleEndian>(self.compression_level)?;
                writer.write_u32::<LittleEndian>(self.reserved)?;
            }
        }
        Ok(())
    }

    /// Read one record.  Path-table formats leave `name` empty for the
    /// caller to resolve from `path_offset`.
    pub fn read<R: Read>(tag: FormatTag, mut reader: R) -> io::Result<Self> {
        let spec = tag.spec();
        let mut e = Entry::new(b"");
        if spec.name_width > 0 {
            let field = read_fixed(&mut reader, spec.name_width)?;
            e.name = field_text(&field).to_vec();
        } else {
            e.path_offset = reader.read_u32::<LittleEndian>()?;
        }
        e.size = reader.read_u32::<LittleEndian>()?;
        e.offset = reader.read_u32::<LittleEndian>()?;
        e.uncompressed = e.size;
        match tag {
            FormatTag::Pod1 => {}
            FormatTag::Pod2 | FormatTag::Pod3 | FormatTag::Epd => {
                e.timestamp = reader.read_u32::<LittleEndian>()?;
                e.checksum  = reader.read_u32::<LittleEndian>()?;
            }
            FormatTag::Pod4 | FormatTag::Pod5 => {
                e.uncompressed      = reader.read_u32::<LittleEndian>()?;
                e.compression_level = reader.read_u32::<LittleEndian>()?;
                e.timestamp         = reader.read_u32::<LittleEndian>()?;
                e.checksum          = reader.read_u32::<LittleEndian>()?;
            }
            FormatTag::Pod6 => {
                e.uncompressed      = reader.read_u32::<LittleEndian>()?;
                e.compression_level = reader.read_u32::<LittleEndian>()?;
                e.reserved          = reader.read_u32::<LittleEndian>()?;
            }
        }
        Ok(e)
    }
}

// ── Listing view ────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by listings (and `list --json`).
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub index:             usize,
    pub name:              String,
    pub offset:            u32,
    pub size:              u32,
    pub uncompressed:      u32,
    pub compression_level: u32,
    pub timestamp:         u32,
    pub checksum:          u32,
}

impl EntryInfo {
    pub fn new(index: usize, e: &Entry) -> Self {
        EntryInfo {
            index,
            name:              e.display_name(),
            offset:            e.offset,
            size:              e.size,
            uncompressed:      e.uncompressed,
            compression_level: e.compression_level,
            timestamp:         e.timestamp,
            checksum:          e.checksum,
        }
    }
}

// ── Audit trail ─────────────────────────────────────────────────────────────

pub const AUDIT_USER_SIZE: usize = 32;
pub const AUDIT_PATH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Add,
    Remove,
    Change,
}

impl AuditAction {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(AuditAction::Add),
            1 => Some(AuditAction::Remove),
            2 => Some(AuditAction::Change),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AuditAction::Add    => "Add",
            AuditAction::Remove => "Remove",
            AuditAction::Change => "Change",
        }
    }
}

/// Historical add/remove/change record (POD2–POD4).  Read and printed only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub user:          Vec<u8>,
    pub timestamp:     u32,
    /// Raw action word; see [`AuditEntry::action`].
    pub action:        u32,
    pub path:          Vec<u8>,
    pub old_timestamp: u32,
    pub old_size:      u32,
    pub new_timestamp: u32,
    pub new_size:      u32,
}

impl AuditEntry {
    pub fn action(&self) -> Option<AuditAction> {
        AuditAction::from_u32(self.action)
    }

    pub fn user_text(&self) -> &[u8] { field_text(&self.user) }
    pub fn path_text(&self) -> &[u8] { field_text(&self.path) }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_field(&mut writer, &self.user, AUDIT_USER_SIZE)?;
        writer.write_u32::<LittleEndian>(self.timestamp)?;
        writer.write_u32::<LittleEndian>(self.action)?;
        write_field(&mut writer, &self.path, AUDIT_PATH_SIZE)?;
        writer.write_u32::<LittleEndian>(self.old_timestamp)?;
        writer.write_u32::<LittleEndian>(self.old_size)?;
        writer.write_u32::<LittleEndian>(self.new_timestamp)?;
        writer.write_u32::<LittleEndian>(self.new_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            user:          read_fixed(&mut reader, AUDIT_USER_SIZE)?,
            timestamp:     reader.read_u32::<LittleEndian>()?,
            action:        reader.read_u32::<LittleEndian>()?,
            path:          read_fixed(&mut reader, AUDIT_PATH_SIZE)?,
            old_timestamp: reader.read_u32::<LittleEndian>()?,
            old_size:      reader.read_u32::<LittleEndian>()?,
            new_timestamp: reader.read_u32::<LittleEndian>()?,
            new_size:      reader.read_u32::<LittleEndian>()?,
        })
    }

    /// CRC of the encoded record.
    pub fn checksum(&self) -> io::Result<u32> {
        let mut buf = Vec::with_capacity(crate::format::AUDIT_ENTRY_SIZE);
        self.write(&mut buf)?;
        Ok(checksum(&buf))
    }
}
