//! Format registry: static knowledge of the seven supported container variants.
//!
//! Every variant starts with a 4-byte ASCII magic.  The rest of the layout is
//! described by one immutable [`FormatSpec`] row; the generic codec in
//! [`crate::archive`] reads these rows instead of carrying a code path per
//! format.

use std::fmt;

use crate::error::{PodError, PodResult};

// ── Shared field widths ─────────────────────────────────────────────────────

/// Length of the leading magic identifier.
pub const MAGIC_SIZE: usize = 4;
/// Comment width used by POD1–POD6.
pub const COMMENT_SIZE: usize = 80;
/// Comment width used by EPD.
pub const EPD_COMMENT_SIZE: usize = 256;
/// Author / copyright width (POD3–POD5).
pub const AUTHOR_SIZE: usize = 80;
/// Width of the `next_archive` continuation field (POD5, POD6).
pub const NEXT_ARCHIVE_SIZE: usize = 256;
/// Longest name a path table entry may carry, terminator excluded.
pub const PATH_MAX: usize = 255;

// ── FormatTag ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    Pod1,
    Pod2,
    Pod3,
    Pod4,
    Pod5,
    Pod6,
    Epd,
}

/// Where the directory array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryPlacement {
    /// Directly after the header, before any payload.
    AfterHeader,
    /// At the header-declared `index_offset`, after the payload.
    Indexed,
}

/// Byte range the file-level checksum covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumRange {
    /// Everything after the first `skip` bytes.
    File { skip: usize },
    /// Payload region only.
    Payload,
}

/// One row of the registry.
#[derive(Debug)]
pub struct FormatSpec {
    pub tag:              FormatTag,
    pub magic:            [u8; 4],
    pub header_size:      usize,
    pub entry_size:       usize,
    /// Width of the in-entry name field; 0 when names live in a path table.
    pub name_width:       usize,
    pub max_name_len:     usize,
    pub placement:        DirectoryPlacement,
    pub checksum_range:   ChecksumRange,
    /// Byte offset of the stored file checksum inside the header, if any.
    pub checksum_field:   Option<usize>,
    pub has_audit:        bool,
    pub has_compression:  bool,
    pub has_next_archive: bool,
    pub description:      &'static str,
}

impl FormatSpec {
    #[inline]
    pub fn has_path_table(&self) -> bool {
        self.name_width == 0
    }
}

/// Size of one audit-trail record (POD2–POD4).
pub const AUDIT_ENTRY_SIZE: usize = 312;

const POD3_HEADER_SIZE: usize = 0x128;

static FORMATS: [FormatSpec; 7] = [
    FormatSpec {
        tag:              FormatTag::Pod1,
        magic:            *b"POD1",
        header_size:      MAGIC_SIZE + 4 + COMMENT_SIZE,
        entry_size:       32 + 4 + 4,
        name_width:       32,
        max_name_len:     31,
        placement:        DirectoryPlacement::AfterHeader,
        // Skips the entry count as if it were a checksum word.
        checksum_range:   ChecksumRange::File { skip: 8 },
        checksum_field:   None,
        has_audit:        false,
        has_compression:  false,
        has_next_archive: false,
        description:      "Terminal Reality POD1 (Fly!, Nocturne)",
    },
    FormatSpec {
        tag:              FormatTag::Pod2,
        magic:            *b"POD2",
        header_size:      0x60,
        entry_size:       20,
        name_width:       0,
        max_name_len:     PATH_MAX,
        placement:        DirectoryPlacement::AfterHeader,
        checksum_range:   ChecksumRange::File { skip: 8 },
        checksum_field:   Some(4),
        has_audit:        true,
        has_compression:  false,
        has_next_archive: false,
        description:      "Terminal Reality POD2 (Fly! 2, 4x4 Evolution)",
    },
    FormatSpec {
        tag:              FormatTag::Pod3,
        magic:            *b"POD3",
        header_size:      POD3_HEADER_SIZE,
        entry_size:       20,
        name_width:       0,
        max_name_len:     PATH_MAX,
        placement:        DirectoryPlacement::Indexed,
        checksum_range:   ChecksumRange::File { skip: 8 },
        checksum_field:   Some(4),
        has_audit:        true,
        has_compression:  false,
        has_next_archive: false,
        description:      "Terminal Reality POD3 (BloodRayne, Nocturne)",
    },
    FormatSpec {
        tag:              FormatTag::Pod4,
        magic:            *b"POD4",
        header_size:      POD3_HEADER_SIZE,
        entry_size:       28,
        name_width:       0,
        max_name_len:     PATH_MAX,
        placement:        DirectoryPlacement::Indexed,
        checksum_range:   ChecksumRange::Payload,
        checksum_field:   Some(4),
        has_audit:        true,
        has_compression:  true,
        has_next_archive: false,
        description:      "Terminal Reality POD4 (BloodRayne 2)",
    },
    FormatSpec {
        tag:              FormatTag::Pod5,
        magic:            *b"POD5",
        header_size:      POD3_HEADER_SIZE + NEXT_ARCHIVE_SIZE,
        entry_size:       28,
        name_width:       0,
        max_name_len:     PATH_MAX,
        placement:        DirectoryPlacement::Indexed,
        checksum_range:   ChecksumRange::File { skip: 8 },
        checksum_field:   Some(4),
        has_audit:        false,
        has_compression:  true,
        has_next_archive: true,
        description:      "Terminal Reality POD5 (Ghostbusters)",
    },
    FormatSpec {
        tag:              FormatTag::Pod6,
        magic:            *b"POD6",
        header_size:      MAGIC_SIZE + 4 * 4 + COMMENT_SIZE + NEXT_ARCHIVE_SIZE,
        entry_size:       24,
        name_width:       0,
        max_name_len:     PATH_MAX,
        placement:        DirectoryPlacement::Indexed,
        checksum_range:   ChecksumRange::File { skip: MAGIC_SIZE },
        checksum_field:   None,
        has_audit:        false,
        has_compression:  true,
        has_next_archive: true,
        description:      "Terminal Reality POD6 (Ghostbusters remaster)",
    },
    FormatSpec {
        tag:              FormatTag::Epd,
        magic:            *b"dtxe",
        header_size:      MAGIC_SIZE + EPD_COMMENT_SIZE + 3 * 4,
        entry_size:       64 + 4 * 4,
        name_width:       64,
        max_name_len:     63,
        placement:        DirectoryPlacement::AfterHeader,
        checksum_range:   ChecksumRange::Payload,
        checksum_field:   Some(MAGIC_SIZE + EPD_COMMENT_SIZE + 8),
        has_audit:        false,
        has_compression:  false,
        has_next_archive: false,
        description:      "Terminal Reality EPD (Fly! 2 extended)",
    },
];

impl FormatTag {
    pub const ALL: [FormatTag; 7] = [
        FormatTag::Pod1,
        FormatTag::Pod2,
        FormatTag::Pod3,
        FormatTag::Pod4,
        FormatTag::Pod5,
        FormatTag::Pod6,
        FormatTag::Epd,
    ];

    /// Registry row for this tag.
    #[inline]
    pub fn spec(self) -> &'static FormatSpec {
        match self {
            FormatTag::Pod1 => &FORMATS[0],
            FormatTag::Pod2 => &FORMATS[1],
            FormatTag::Pod3 => &FORMATS[2],
            FormatTag::Pod4 => &FORMATS[3],
            FormatTag::Pod5 => &FORMATS[4],
            FormatTag::Pod6 => &FORMATS[5],
            FormatTag::Epd  => &FORMATS[6],
        }
    }

    #[inline]
    pub fn magic(self) -> &'static [u8; 4] {
        &self.spec().magic
    }

    /// Short lowercase name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            FormatTag::Pod1 => "pod1",
            FormatTag::Pod2 => "pod2",
            FormatTag::Pod3 => "pod3",
            FormatTag::Pod4 => "pod4",
            FormatTag::Pod5 => "pod5",
            FormatTag::Pod6 => "pod6",
            FormatTag::Epd  => "epd",
        }
    }

    /// Parse from a CLI string; unknown names are `FormatUnsupported`.
    pub fn from_name(s: &str) -> PodResult<Self> {
        FormatTag::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s) || t.magic().eq_ignore_ascii_case(s.as_bytes()))
            .ok_or_else(|| PodError::FormatUnsupported(s.to_owned()))
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.magic()))
    }
}

/// Match the first four bytes of a buffer against the registry.
///
/// Only the magic is consulted; returns `None` for short or unknown input.
pub fn identify(prefix: &[u8]) -> Option<FormatTag> {
    let magic = prefix.get(..MAGIC_SIZE)?;
    FormatTag::ALL.iter().copied().find(|t| t.magic() == magic)
}

/// Human-readable description for diagnostics.
pub fn describe(tag: FormatTag) -> &'static str {
    tag.spec().description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_every_magic() {
        for tag in FormatTag::ALL {
            let mut buf = tag.magic().to_vec();
            buf.extend_from_slice(&[0u8; 16]);
            assert_eq!(identify(&buf), Some(tag));
        }
    }

    #[test]
    fn identify_rejects_unknown_and_short() {
        assert_eq!(identify(b"POD7...."), None);
        assert_eq!(identify(b"PO"), None);
        assert_eq!(identify(b""), None);
    }

    #[test]
    fn header_sizes_match_layouts() {
        assert_eq!(FormatTag::Pod1.spec().header_size, 88);
        assert_eq!(FormatTag::Pod2.spec().header_size, 0x60);
        assert_eq!(FormatTag::Pod3.spec().header_size, 0x128);
        assert_eq!(FormatTag::Pod5.spec().header_size, 0x228);
        assert_eq!(FormatTag::Pod6.spec().header_size, 0x164);
        assert_eq!(FormatTag::Epd.spec().header_size, 272);
    }

    #[test]
    fn from_name_accepts_names_and_magics() {
        assert_eq!(FormatTag::from_name("pod4").unwrap(), FormatTag::Pod4);
        assert_eq!(FormatTag::from_name("POD6").unwrap(), FormatTag::Pod6);
        assert_eq!(FormatTag::from_name("EPD").unwrap(), FormatTag::Epd);
        assert_eq!(FormatTag::from_name("dtxe").unwrap(), FormatTag::Epd);
        assert!(matches!(FormatTag::from_name("zip"), Err(PodError::FormatUnsupported(_))));
    }

    #[test]
    fn describe_is_nonempty() {
        for tag in FormatTag::ALL {
            assert!(!describe(tag).is_empty());
        }
    }
}
