//! Block framing shared by the writer, the streaming reader and the scanner.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::binary::{read_exact_vec, read_long, write_long};
use crate::codec::Codec;
use crate::datum::{self, DecodeLimits};
use crate::error::{Error, Result};
use crate::resolve::ResolvedSchema;
use crate::value::Value;

use super::{SyncMarker, SYNC_SIZE};

/// Write one block: `count | len | payload | sync`.
pub(crate) fn write_block<W: Write + ?Sized>(
    w:       &mut W,
    count:   u64,
    payload: &[u8],
    sync:    &SyncMarker,
) -> io::Result<()> {
    write_long(w, count as i64)?;
    write_long(w, payload.len() as i64)?;
    w.write_all(payload)?;
    w.write_all(sync)
}

/// Read a long, or `None` if the source is already exhausted.
pub(crate) fn read_long_or_eof<R: Read + ?Sized>(r: &mut R) -> Result<Option<i64>> {
    let mut first = [0u8; 1];
    loop {
        match r.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    read_long(&mut first.as_slice().chain(r)).map(Some)
}

/// A block whose sync marker has been verified, payload still compressed.
#[derive(Debug)]
pub(crate) struct RawBlock {
    /// File offset of the block's count.
    pub offset:  u64,
    pub count:   u64,
    pub payload: Vec<u8>,
}

/// Read the next block from `r`, positioned at a block boundary.  `offset`
/// is that boundary's file offset.  `Ok(None)` is a clean end of file.
pub(crate) fn read_block<R: Read + ?Sized>(
    r:      &mut R,
    offset: u64,
    sync:   &SyncMarker,
) -> Result<Option<RawBlock>> {
    let count = match read_long_or_eof(r)? {
        None => return Ok(None),
        Some(c) => c,
    };
    let len = if count == 0 {
        // A lone zero count at the very end is a terminator.
        match read_long_or_eof(r)? {
            None => return Ok(None),
            Some(len) => len,
        }
    } else {
        read_long(r)?
    };
    if count < 0 || len < 0 {
        return Err(Error::CorruptBlock {
            offset,
            reason: format!("negative block count {count} or length {len}"),
        });
    }

    let payload = read_exact_vec(r, len as usize)?;
    let mut marker = [0u8; SYNC_SIZE];
    r.read_exact(&mut marker)?;
    if &marker != sync {
        return Err(Error::CorruptBlock {
            offset,
            reason: format!("sync marker mismatch (found {})", hex::encode(marker)),
        });
    }
    Ok(Some(RawBlock { offset, count: count as u64, payload }))
}

/// Decompress a verified block.
pub(crate) fn decompress(codec: &dyn Codec, block: RawBlock, limits: DecodeLimits) -> Result<BlockItems> {
    let payload = codec.decompress(&block.payload, None).map_err(|e| Error::CorruptBlock {
        offset: block.offset,
        reason: format!("{} decompression failed: {e}", codec.name()),
    })?;
    Ok(BlockItems { payload, pos: 0, remaining: block.count, offset: block.offset, limits })
}

/// Decoded-on-demand items of one block.
#[derive(Debug)]
pub(crate) struct BlockItems {
    payload:   Vec<u8>,
    pos:       usize,
    remaining: u64,
    offset:    u64,
    limits:    DecodeLimits,
}

impl BlockItems {
    pub fn remaining(&self) -> u64 { self.remaining }

    /// Decode the next item.  Offsets in item errors are relative to the
    /// start of the decompressed payload.
    pub fn next_value(&mut self, resolved: &ResolvedSchema) -> Result<Value> {
        let mut rest = &self.payload[self.pos..];
        let before = rest.len();
        let result = datum::decode(resolved, &mut rest, self.pos as u64, self.limits);
        let consumed = before - rest.len();
        self.pos += consumed;
        // Every item has the same schema: one empty item means all are.
        if result.is_ok() && consumed == 0 && self.remaining > self.limits.max_empty_items {
            let count = self.remaining;
            self.remaining = 0;
            return Err(Error::CorruptBlock {
                offset: self.offset,
                reason: format!(
                    "{count} zero-width items exceed the limit of {}",
                    self.limits.max_empty_items
                ),
            });
        }
        self.remaining = self.remaining.saturating_sub(1);
        result.map_err(|e| {
            if e.is_truncated() {
                Error::CorruptBlock {
                    offset: self.offset,
                    reason: format!("payload too short for its item count: {e}"),
                }
            } else {
                e
            }
        })
    }

    /// Check that the payload was consumed exactly.
    pub fn finish(&self) -> Result<()> {
        let left = self.payload.len() - self.pos;
        if left != 0 {
            return Err(Error::CorruptBlock {
                offset: self.offset,
                reason: format!("{left} bytes left after the last item"),
            });
        }
        Ok(())
    }

    /// Decode every remaining item and check the payload end.
    pub fn decode_all(mut self, resolved: &ResolvedSchema) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(self.remaining.min(1 << 16) as usize);
        while self.remaining > 0 {
            out.push(self.next_value(resolved)?);
        }
        self.finish()?;
        Ok(out)
    }
}

/// Offset of the first complete `sync` at or after `from`.
pub(crate) fn find_sync(data: &[u8], from: usize, sync: &SyncMarker) -> Option<usize> {
    data.get(from..)?
        .windows(SYNC_SIZE)
        .position(|w| w == sync)
        .map(|i| from + i)
}

/// Decompress and decode one raw block.
pub(crate) fn decode_raw(
    codec:    &Arc<dyn Codec>,
    resolved: &ResolvedSchema,
    block:    RawBlock,
    limits:   DecodeLimits,
) -> Result<Vec<Value>> {
    decompress(codec.as_ref(), block, limits)?.decode_all(resolved)
}
