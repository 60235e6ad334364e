//! Container writer.
//!
//! Values are encoded into a pending buffer as they are appended.  When the
//! buffer reaches `block_size` bytes (or `max_items` values, if set) it is
//! compressed and written as one block.  The header is written at the first
//! flush, so metadata may be added at any point before that.
//!
//! Dropping a writer flushes whatever is pending; use [`Writer::close`] to
//! see flush errors and get the sink back.
//!
//! A failed write to the sink may leave part of a header or block behind, so
//! after one the writer refuses further writes, and dropping it writes
//! nothing.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::binary::Position;
use crate::codec::{get_codec, Codec, CodecId};
use crate::datum::{BlockFraming, Encoder};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::Value;

use super::block::write_block;
use super::header::Header;
use super::{
    new_sync_marker, SyncMarker, CODEC_KEY, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL,
    RESERVED_PREFIX, SCHEMA_KEY,
};

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct WriterOptions {
    pub codec:       Arc<dyn Codec>,
    pub level:       i32,
    /// Flush once this many encoded bytes are pending.
    pub block_size:  usize,
    /// Also flush once this many values are pending.
    pub max_items:   Option<usize>,
    pub framing:     BlockFraming,
    /// Fixed sync marker for reproducible output; random when `None`.
    pub sync_marker: Option<SyncMarker>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            codec:       get_codec(CodecId::Null),
            level:       DEFAULT_COMPRESSION_LEVEL,
            block_size:  DEFAULT_BLOCK_SIZE,
            max_items:   None,
            framing:     BlockFraming::Plain,
            sync_marker: None,
        }
    }
}

impl WriterOptions {
    pub fn with_codec(mut self, id: CodecId) -> Self {
        self.codec = get_codec(id);
        self
    }
}

impl fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOptions")
            .field("codec", &self.codec.name())
            .field("level", &self.level)
            .field("block_size", &self.block_size)
            .field("max_items", &self.max_items)
            .field("framing", &self.framing)
            .field("sync_marker", &self.sync_marker.map(hex::encode))
            .finish()
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct Writer<W: Write> {
    /// `None` only after `close()`.
    sink:           Option<Position<W>>,
    schema:         Arc<Schema>,
    options:        WriterOptions,
    sync:           SyncMarker,
    metadata:       BTreeMap<String, Vec<u8>>,
    header_written: bool,
    /// Set once a write to the sink fails.
    failed:         bool,

    pending:        Vec<u8>,
    pending_items:  usize,

    blocks_written: u64,
    items_written:  u64,
}

impl<W: Write> Writer<W> {
    pub fn new(schema: Arc<Schema>, sink: W) -> Self {
        Self::with_options(schema, sink, WriterOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, sink: W, options: WriterOptions) -> Self {
        let sync = options.sync_marker.unwrap_or_else(new_sync_marker);
        Self {
            sink:           Some(Position::new(sink)),
            schema,
            sync,
            metadata:       BTreeMap::new(),
            header_written: false,
            failed:         false,
            pending:        Vec::with_capacity(options.block_size.min(1 << 20)),
            pending_items:  0,
            blocks_written: 0,
            items_written:  0,
            options,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> { &self.schema }

    pub fn sync_marker(&self) -> &SyncMarker { &self.sync }

    pub fn blocks_written(&self) -> u64 { self.blocks_written }

    /// Values appended so far, flushed or not.
    pub fn items_written(&self) -> u64 { self.items_written }

    /// Add a user metadata entry.  Only allowed before the header is
    /// written; `avro.`-prefixed keys are reserved.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<()> {
        let key = key.into();
        if key.starts_with(RESERVED_PREFIX) {
            return Err(Error::InvalidHeader(format!("metadata key '{key}' is reserved")));
        }
        if self.header_written {
            return Err(Error::InvalidHeader(format!(
                "cannot set '{key}': the header has already been written"
            )));
        }
        self.metadata.insert(key, value.into());
        Ok(())
    }

    /// Encode one value into the pending block.  A value that fails to
    /// encode leaves the pending block untouched.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        if self.failed {
            return Err(sink_failed());
        }
        Encoder::new(&self.schema)
            .with_framing(self.options.framing)
            .encode(value, &mut self.pending)?;
        self.pending_items += 1;
        self.items_written += 1;

        let by_items = self.options.max_items.is_some_and(|max| self.pending_items >= max);
        if self.pending.len() >= self.options.block_size || by_items {
            self.flush()?;
        }
        Ok(())
    }

    /// Append every value; returns how many were appended.
    pub fn append_all<I, V>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        let mut n = 0;
        for v in values {
            self.append(v.borrow())?;
            n += 1;
        }
        Ok(n)
    }

    /// Write the header if needed, then the pending block if any.
    pub fn flush(&mut self) -> Result<()> {
        if self.failed {
            return Err(sink_failed());
        }
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::InvalidHeader("writer is closed".into()))?;

        if !self.header_written {
            let mut metadata = self.metadata.clone();
            metadata.insert(SCHEMA_KEY.to_string(), self.schema.to_string().into_bytes());
            metadata.insert(CODEC_KEY.to_string(), self.options.codec.name().as_bytes().to_vec());
            if let Err(e) = (Header { metadata, sync: self.sync }).write(sink) {
                self.failed = true;
                return Err(e.into());
            }
            self.header_written = true;
            debug!(codec = self.options.codec.name(), sync = %hex::encode(self.sync), "wrote container header");
        }

        if self.pending_items > 0 {
            let offset = sink.position();
            let payload = self.options.codec.compress(&self.pending, self.options.level)?;
            if let Err(e) = write_block(sink, self.pending_items as u64, &payload, &self.sync) {
                self.failed = true;
                return Err(e.into());
            }
            debug!(
                offset,
                items = self.pending_items,
                raw_len = self.pending.len(),
                payload_len = payload.len(),
                "flushed block"
            );
            self.blocks_written += 1;
            self.pending.clear();
            self.pending_items = 0;
        }

        if let Err(e) = sink.flush() {
            self.failed = true;
            return Err(e.into());
        }
        Ok(())
    }

    pub fn is_failed(&self) -> bool { self.failed }

    /// Flush and return the current position, a block boundary that
    /// [`Reader`](super::Reader) can start from after a header.
    pub fn sync(&mut self) -> Result<u64> {
        self.flush()?;
        Ok(self.sink.as_ref().map_or(0, Position::position))
    }

    /// Flush and hand back the sink.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        self.sink
            .take()
            .map(Position::into_inner)
            .ok_or_else(|| Error::InvalidHeader("writer is closed".into()))
    }
}

fn sink_failed() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "an earlier write to the sink failed"))
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.sink.is_none() || self.failed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, pending = self.pending_items, "flush on drop failed");
        }
    }
}
