//! Block-parallel decoding of a scanned container image.
//!
//! Blocks are independent compression and encoding units, so once
//! [`scan`](super::scan) has found their boundaries each healthy block can
//! be decompressed and decoded on its own.  With the `parallel` feature the
//! blocks are spread over the rayon pool; without it they are decoded one
//! after another.  Either way the output is in file order.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::resolve::ResolvedSchema;
use crate::value::Value;

use super::block::{decode_raw, RawBlock};
use super::reader::ReaderOptions;
use super::scan::{ScanReport, ScannedBlock};

/// Decode every healthy block of `data`, the image `report` was made from.
///
/// Returns one `Vec<Value>` per healthy block, in file order.  If any block
/// fails, the first failure in file order is returned.
pub fn decode_blocks(
    data:    &[u8],
    report:  &ScanReport,
    options: ReaderOptions,
) -> Result<Vec<Vec<Value>>> {
    let limits = options.limits;
    let writer = Arc::new(report.header.schema()?);
    let codec = options.registry.get(&report.codec)?;
    let reader = options.reader_schema.unwrap_or_else(|| Arc::clone(&writer));
    let resolved = ResolvedSchema::new(writer, reader)?;

    let healthy: Vec<&ScannedBlock> = report.blocks.iter().filter(|b| b.is_usable()).collect();
    debug!(blocks = healthy.len(), codec = %report.codec, "decoding blocks");

    let one = |block: &ScannedBlock| -> Result<Vec<Value>> {
        let payload = block.payload(data).ok_or_else(|| crate::error::Error::CorruptBlock {
            offset: block.offset,
            reason: "payload lies outside the scanned image".into(),
        })?;
        let raw = RawBlock { offset: block.offset, count: block.count, payload: payload.to_vec() };
        decode_raw(&codec, &resolved, raw, limits)
    };

    // Rayon is an optional dependency; fall back to sequential if unavailable.
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let results: Vec<Result<Vec<Value>>> = healthy.par_iter().map(|b| one(b)).collect();
        results.into_iter().collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        healthy.into_iter().map(one).collect()
    }
}

/// All values of every healthy block, flattened in file order.
pub fn read_all(data: &[u8], options: ReaderOptions) -> Result<Vec<Value>> {
    let report = super::scan(data)?;
    Ok(decode_blocks(data, &report, options)?.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecId;
    use crate::container::{scan, Writer, WriterOptions};
    use crate::schema::Schema;

    fn image(n: i32, codec: CodecId) -> Vec<u8> {
        let schema = Arc::new(Schema::parse_str(r#""int""#).unwrap());
        let opts = WriterOptions { max_items: Some(16), ..Default::default() }.with_codec(codec);
        let mut w = Writer::with_options(schema, Vec::new(), opts);
        w.append_all((0..n).map(Value::Int)).unwrap();
        w.close().unwrap()
    }

    #[test]
    fn matches_sequential_reader() {
        for codec in CodecId::ALL {
            let data = image(200, codec);
            let all = read_all(&data, ReaderOptions::default()).unwrap();
            assert_eq!(all, (0..200).map(Value::Int).collect::<Vec<_>>(), "{codec}");
        }
    }

    #[test]
    fn one_vec_per_block() {
        let data = image(40, CodecId::Zstandard);
        let report = scan(&data).unwrap();
        let blocks = decode_blocks(&data, &report, ReaderOptions::default()).unwrap();
        let sizes: Vec<usize> = blocks.iter().map(Vec::len).collect();
        assert_eq!(sizes, [16, 16, 8]);
    }

    #[test]
    fn damaged_blocks_are_left_out() {
        let mut data = image(48, CodecId::Null);
        let report = scan(&data).unwrap();
        let middle = &report.blocks[1];
        let marker_at = (middle.payload_offset + middle.payload_len) as usize;
        data[marker_at] ^= 0xFF;
        // Blocks two and three are lost; see the scanner.
        let all = read_all(&data, ReaderOptions::default()).unwrap();
        assert_eq!(all, (0..16).map(Value::Int).collect::<Vec<_>>());
    }

    #[test]
    fn reader_schema_applies() {
        let data = image(3, CodecId::Deflate);
        let reader = Arc::new(Schema::parse_str(r#""long""#).unwrap());
        let opts = ReaderOptions { reader_schema: Some(reader), ..Default::default() };
        let all = read_all(&data, opts).unwrap();
        assert_eq!(all, [Value::Long(0), Value::Long(1), Value::Long(2)]);
    }
}
