//! Object container files.
//!
//! # Layout
//! ```text
//! MAGIC "Obj\x01" | METADATA | SYNC(16) | BLOCK*
//! BLOCK = COUNT(long) | PAYLOAD_LEN(long) | PAYLOAD | SYNC(16)
//! ```
//! `METADATA` is a map of string keys to bytes values in the ordinary map
//! block framing.  It always carries `avro.schema` (the writer schema as JSON
//! text) and `avro.codec`.  Every block is compressed on its own with the file
//! codec, and is followed by the file's sync marker so that a reader can
//! verify block boundaries and skip forward past damage.

mod block;
pub mod header;
pub mod parallel;
pub mod reader;
pub mod scan;
pub mod writer;

pub use header::Header;
pub use reader::{Reader, ReaderOptions};
pub use scan::{scan, BlockHealth, ScanReport, ScannedBlock};
pub use writer::{Writer, WriterOptions};

/// First four bytes of every container file.
pub const MAGIC: [u8; 4] = *b"Obj\x01";
/// Length of the per-file sync marker.
pub const SYNC_SIZE: usize = 16;

/// Metadata key holding the writer schema JSON.
pub const SCHEMA_KEY: &str = "avro.schema";
/// Metadata key holding the codec name.
pub const CODEC_KEY:  &str = "avro.codec";
/// Keys with this prefix are reserved for the format itself.
pub const RESERVED_PREFIX: &str = "avro.";

/// Pending bytes that trigger a block flush.
pub const DEFAULT_BLOCK_SIZE:        usize = 64_000;
/// Compression level handed to the codec when none is chosen.
pub const DEFAULT_COMPRESSION_LEVEL: i32   = 3;

/// A 16-byte block sync marker.
pub type SyncMarker = [u8; SYNC_SIZE];

/// A fresh random sync marker.
pub fn new_sync_marker() -> SyncMarker {
    *uuid::Uuid::new_v4().as_bytes()
}
