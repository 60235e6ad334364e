//! Block scanner: map a container image without decoding any value.
//!
//! # How it works
//!
//! The scanner parses the header, then walks block framing only: count,
//! payload length, and the trailing sync marker.  A block whose marker does
//! not match is recorded and the scanner searches forward for the next
//! occurrence of the marker, carrying on from there.  Payloads are neither
//! decompressed nor decoded.
//!
//! ## Block health
//!
//! - `Healthy`: framing parsed and the sync marker matches.
//! - `BadSync`: framing parsed but the trailing marker differs.
//! - `BadFraming`: count or length is negative or not a valid varint.
//! - `Truncated`: the file ends inside the block.

use std::io::Cursor;

use serde::Serialize;

use crate::binary::read_long;
use crate::error::Result;

use super::block::find_sync;
use super::header::Header;
use super::{SyncMarker, SYNC_SIZE};

// ── Types ─────────────────────────────────────────────────────────────────────

/// The health verdict for one scanned block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockHealth {
    Healthy,
    BadSync,
    BadFraming,
    /// `declared` bytes of payload plus marker, `available` left in the file.
    Truncated { declared: u64, available: u64 },
}

impl BlockHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, BlockHealth::Healthy)
    }
}

/// Diagnostic record for one block position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedBlock {
    /// File offset of the block's count.
    pub offset:         u64,
    pub count:          u64,
    /// File offset of the first payload byte.
    pub payload_offset: u64,
    pub payload_len:    u64,
    pub health:         BlockHealth,
}

impl ScannedBlock {
    pub fn is_usable(&self) -> bool {
        self.health.is_usable()
    }

    /// The compressed payload inside `data`, the image this block was
    /// scanned from.
    pub fn payload<'d>(&self, data: &'d [u8]) -> Option<&'d [u8]> {
        let start = usize::try_from(self.payload_offset).ok()?;
        let len = usize::try_from(self.payload_len).ok()?;
        data.get(start..start.checked_add(len)?)
    }
}

/// Complete report produced by [`scan`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub codec:         String,
    /// Sync marker, hex encoded.
    pub sync:          String,
    pub header_len:    u64,
    pub total_bytes:   u64,
    pub blocks:        Vec<ScannedBlock>,
    /// Bytes passed over while searching for a sync marker.
    pub skipped_bytes: u64,
    #[serde(skip)]
    pub header:        Header,
}

impl ScanReport {
    pub fn healthy_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_usable()).count()
    }

    /// Items in healthy blocks.
    pub fn healthy_items(&self) -> u64 {
        self.blocks.iter().filter(|b| b.is_usable()).map(|b| b.count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped_bytes == 0 && self.healthy_blocks() == self.blocks.len()
    }

    /// Summary line for display.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} blocks healthy, {} item(s) readable, {} byte(s) skipped, codec {}",
            self.healthy_blocks(),
            self.blocks.len(),
            self.healthy_items(),
            self.skipped_bytes,
            self.codec,
        )
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Scan a whole container image.
///
/// Only a damaged header is an `Err`; damage after the header is reported
/// as [`BlockHealth`] entries.
pub fn scan(data: &[u8]) -> Result<ScanReport> {
    let mut cur = Cursor::new(data);
    let header = Header::read(&mut cur)?;
    let header_len = cur.position();
    let sync = header.sync;

    let mut report = ScanReport {
        codec:         header.codec_name()?.to_string(),
        sync:          hex::encode(sync),
        header_len,
        total_bytes:   data.len() as u64,
        blocks:        Vec::new(),
        skipped_bytes: 0,
        header,
    };

    let mut pos = header_len as usize;
    while pos < data.len() {
        match scan_block(data, pos, &sync) {
            Step::End => break,
            Step::Next(block, next) => {
                report.blocks.push(block);
                pos = next;
            }
            Step::Lost(block) => {
                let stop = matches!(block.health, BlockHealth::Truncated { .. });
                report.blocks.push(block);
                if stop {
                    break;
                }
                // Resume just past the next marker.
                match find_sync(data, pos + 1, &sync) {
                    Some(at) => {
                        let next = at + SYNC_SIZE;
                        report.skipped_bytes += (next - pos) as u64;
                        pos = next;
                    }
                    None => {
                        report.skipped_bytes += (data.len() - pos) as u64;
                        break;
                    }
                }
            }
        }
    }
    Ok(report)
}

enum Step {
    /// Clean end of the block sequence.
    End,
    /// A healthy block and the offset of the next one.
    Next(ScannedBlock, usize),
    /// A damaged block; the caller must search for the next marker.
    Lost(ScannedBlock),
}

fn scan_block(data: &[u8], pos: usize, sync: &SyncMarker) -> Step {
    let mut cur = Cursor::new(&data[pos..]);
    let mut block = ScannedBlock {
        offset:         pos as u64,
        count:          0,
        payload_offset: pos as u64,
        payload_len:    0,
        health:         BlockHealth::BadFraming,
    };

    let count = match read_long(&mut cur) {
        Ok(c) => c,
        Err(e) if e.is_truncated() => {
            block.health = BlockHealth::Truncated { declared: 0, available: (data.len() - pos) as u64 };
            return Step::Lost(block);
        }
        Err(_) => return Step::Lost(block),
    };
    if count == 0 && pos + cur.position() as usize == data.len() {
        return Step::End;
    }
    let len = match read_long(&mut cur) {
        Ok(l) => l,
        Err(e) if e.is_truncated() => {
            block.health = BlockHealth::Truncated { declared: 0, available: (data.len() - pos) as u64 };
            return Step::Lost(block);
        }
        Err(_) => return Step::Lost(block),
    };
    if count < 0 || len < 0 {
        return Step::Lost(block);
    }

    block.count = count as u64;
    block.payload_offset = (pos as u64) + cur.position();
    block.payload_len = len as u64;

    let sync_at = block.payload_offset.saturating_add(block.payload_len);
    let end = sync_at.saturating_add(SYNC_SIZE as u64);
    if end > data.len() as u64 {
        block.health = BlockHealth::Truncated {
            declared:  block.payload_len + SYNC_SIZE as u64,
            available: data.len() as u64 - block.payload_offset,
        };
        return Step::Lost(block);
    }
    let (sync_at, end) = (sync_at as usize, end as usize);
    if &data[sync_at..end] != sync {
        block.health = BlockHealth::BadSync;
        return Step::Lost(block);
    }
    block.health = BlockHealth::Healthy;
    Step::Next(block, end)
}
