pub mod archive;
pub mod checksum;
pub mod codec;
pub mod entry;
pub mod error;
pub mod format;
pub mod header;
pub mod index;
pub mod pod;
pub mod report;
pub mod volume;

pub use archive::{Archive, EntryMetadata, PreparedEntry};
pub use codec::{CodecId, CompressionPolicy, get_codec};
pub use entry::{AuditAction, AuditEntry, Entry, EntryInfo};
pub use error::{PodError, PodResult};
pub use format::{describe, identify, FormatTag};
pub use header::Header;
pub use pod::{EntryRef, PodFile};
pub use volume::{VolumeWriter, VOLUME_LIMIT};
