//! Container reader.
//!
//! # States
//! ```text
//! Header ─► BlockStart ─► DecodingItems ─► BlockStart ─► … ─► Eof
//!                │               │
//!                └──── error ────┴─► Failed ── resync() ─► BlockStart
//! ```
//! The header is read by the constructor.  Every block's sync marker is
//! verified before its payload is decompressed.  After any error the reader
//! yields nothing more until [`Reader::resync`] is called; it never skips
//! damage on its own.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use byteorder::ReadBytesExt;
use tracing::{debug, warn};

use crate::binary::Position;
use crate::codec::{Codec, CodecRegistry};
use crate::datum::DecodeLimits;
use crate::error::Result;
use crate::resolve::ResolvedSchema;
use crate::schema::Schema;
use crate::value::Value;

use super::block::{decompress, read_block, BlockItems};
use super::header::Header;
use super::SYNC_SIZE;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Schema to read values as; the writer schema when `None`.
    pub reader_schema: Option<Arc<Schema>>,
    pub registry:      CodecRegistry,
    pub limits:        DecodeLimits,
}

// ── Reader ───────────────────────────────────────────────────────────────────

enum State {
    BlockStart,
    DecodingItems(BlockItems),
    Eof,
    Failed,
}

pub struct Reader<R: Read> {
    src:         Position<R>,
    header:      Header,
    writer:      Arc<Schema>,
    resolved:    Arc<ResolvedSchema>,
    codec:       Arc<dyn Codec>,
    limits:      DecodeLimits,
    state:       State,
    /// True while `src` sits on a block boundary.
    at_boundary: bool,
    blocks_read: u64,
}

impl<R: Read> Reader<R> {
    pub fn new(src: R) -> Result<Self> {
        Self::with_options(src, ReaderOptions::default())
    }

    /// Read values as `reader_schema`, resolving against the file's schema.
    pub fn with_schema(src: R, reader_schema: Arc<Schema>) -> Result<Self> {
        Self::with_options(src, ReaderOptions { reader_schema: Some(reader_schema), ..Default::default() })
    }

    /// Read the header, look up the codec and build the resolution plan.
    /// Fails before any block is read if the codec is unknown or the
    /// schemas are incompatible.
    pub fn with_options(src: R, options: ReaderOptions) -> Result<Self> {
        let mut src = Position::new(src);
        let header = Header::read(&mut src)?;
        let writer = Arc::new(header.schema()?);
        let codec = options.registry.get(header.codec_name()?)?;
        let reader = options.reader_schema.unwrap_or_else(|| Arc::clone(&writer));
        let resolved = Arc::new(ResolvedSchema::new(Arc::clone(&writer), reader)?);
        debug!(codec = codec.name(), header_len = src.position(), "opened container");
        Ok(Self {
            src,
            header,
            writer,
            resolved,
            codec,
            limits:      options.limits,
            state:       State::BlockStart,
            at_boundary: true,
            blocks_read: 0,
        })
    }

    pub fn header(&self) -> &Header { &self.header }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> { self.header.get(key) }

    pub fn writer_schema(&self) -> &Arc<Schema> { &self.writer }

    pub fn reader_schema(&self) -> &Arc<Schema> { self.resolved.reader() }

    pub fn codec_name(&self) -> &str { self.codec.name() }

    /// Bytes consumed from the source.
    pub fn position(&self) -> u64 { self.src.position() }

    pub fn blocks_read(&self) -> u64 { self.blocks_read }

    pub fn is_failed(&self) -> bool { matches!(self.state, State::Failed) }

    pub fn is_eof(&self) -> bool { matches!(self.state, State::Eof) }

    pub fn into_inner(self) -> R { self.src.into_inner() }

    /// Items of the current block not yet returned.
    pub fn remaining_in_block(&self) -> u64 {
        match &self.state {
            State::DecodingItems(items) => items.remaining(),
            _ => 0,
        }
    }

    fn advance(&mut self) -> Result<Option<Value>> {
        loop {
            // Any error below leaves the reader `Failed`.
            match std::mem::replace(&mut self.state, State::Failed) {
                State::Eof => {
                    self.state = State::Eof;
                    return Ok(None);
                }
                State::Failed => return Ok(None),
                State::BlockStart => {
                    let offset = self.src.position();
                    self.at_boundary = false;
                    match read_block(&mut self.src, offset, &self.header.sync)? {
                        None => {
                            self.at_boundary = true;
                            self.state = State::Eof;
                            return Ok(None);
                        }
                        Some(block) => {
                            self.at_boundary = true;
                            self.blocks_read += 1;
                            debug!(offset, items = block.count, payload_len = block.payload.len(), "read block");
                            self.state = State::DecodingItems(decompress(self.codec.as_ref(), block, self.limits)?);
                        }
                    }
                }
                State::DecodingItems(mut items) => {
                    if items.remaining() == 0 {
                        items.finish()?;
                        self.state = State::BlockStart;
                        continue;
                    }
                    let value = items.next_value(&self.resolved)?;
                    self.state = State::DecodingItems(items);
                    return Ok(Some(value));
                }
            }
        }
    }

    /// Skip to the next block boundary after an error.
    ///
    /// If the failure happened after the block's sync marker was verified,
    /// reading resumes at the following block.  Otherwise the source is
    /// searched forward for the next occurrence of the sync marker.  Returns
    /// `false` if the source ended first; the reader is then at `Eof`.
    pub fn resync(&mut self) -> Result<bool> {
        let start = self.src.position();
        if self.at_boundary {
            if !matches!(self.state, State::Eof) {
                self.state = State::BlockStart;
            }
            return Ok(!matches!(self.state, State::Eof));
        }

        let sync = self.header.sync;
        let mut window = [0u8; SYNC_SIZE];
        let mut seen = 0usize;
        loop {
            let byte = match self.src.read_u8() {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(from = start, skipped = self.src.position() - start, "no sync marker before end of file");
                    self.state = State::Eof;
                    self.at_boundary = true;
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            window.copy_within(1.., 0);
            window[SYNC_SIZE - 1] = byte;
            seen += 1;
            if seen >= SYNC_SIZE && window == sync {
                break;
            }
        }
        warn!(from = start, resumed_at = self.src.position(), "resynchronized on sync marker");
        self.state = State::BlockStart;
        self.at_boundary = true;
        Ok(true)
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl<R: Read> fmt::Debug for Reader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::BlockStart       => "BlockStart",
            State::DecodingItems(_) => "DecodingItems",
            State::Eof              => "Eof",
            State::Failed           => "Failed",
        };
        f.debug_struct("Reader")
            .field("codec", &self.codec.name())
            .field("position", &self.src.position())
            .field("blocks_read", &self.blocks_read)
            .field("state", &state)
            .finish()
    }
}
