//! File header: magic, metadata map and sync marker.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::binary::{read_bytes, read_len, read_long, read_string, write_bytes, write_long, write_string};
use crate::codec::CodecId;
use crate::error::{Error, Result};
use crate::schema::Schema;

use super::{SyncMarker, CODEC_KEY, MAGIC, SCHEMA_KEY, SYNC_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Ordered so that header bytes are reproducible.
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub sync:     SyncMarker,
}

impl Header {
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&MAGIC)?;
        if !self.metadata.is_empty() {
            write_long(w, self.metadata.len() as i64)?;
            for (key, value) in &self.metadata {
                write_string(w, key)?;
                write_bytes(w, value)?;
            }
        }
        write_long(w, 0)?;
        w.write_all(&self.sync)
    }

    /// Read and check a header.  Fails `InvalidHeader` on a bad magic; the
    /// metadata contents are checked lazily by the accessors.
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidHeader(format!(
                "bad magic {}, expected {}",
                hex::encode(magic),
                hex::encode(MAGIC)
            )));
        }

        let mut metadata = BTreeMap::new();
        loop {
            let count = read_long(r)?;
            if count == 0 {
                break;
            }
            if count < 0 {
                read_len(r)?;
            }
            for _ in 0..count.unsigned_abs() {
                let key = read_string(r)?;
                let value = read_bytes(r)?;
                metadata.insert(key, value);
            }
        }

        let mut sync = [0u8; SYNC_SIZE];
        r.read_exact(&mut sync)?;
        Ok(Self { metadata, sync })
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.metadata.get(key).map(Vec::as_slice)
    }

    /// The writer schema JSON text.
    pub fn schema_text(&self) -> Result<&str> {
        let raw = self
            .get(SCHEMA_KEY)
            .ok_or_else(|| Error::InvalidHeader(format!("no '{SCHEMA_KEY}' metadata")))?;
        std::str::from_utf8(raw)
            .map_err(|e| Error::InvalidHeader(format!("'{SCHEMA_KEY}' is not UTF-8: {e}")))
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::parse_str(self.schema_text()?)
    }

    /// The codec name; a file without `avro.codec` is uncompressed.
    pub fn codec_name(&self) -> Result<&str> {
        match self.get(CODEC_KEY) {
            None => Ok(CodecId::Null.name()),
            Some(raw) => std::str::from_utf8(raw)
                .map_err(|e| Error::InvalidHeader(format!("'{CODEC_KEY}' is not UTF-8: {e}"))),
        }
    }

    /// Bytes this header occupies on disk.
    pub fn encoded_len(&self) -> usize {
        let mut counter = io::sink();
        let mut pos = crate::binary::Position::new(&mut counter);
        // Writing to a sink cannot fail.
        let _ = self.write(&mut pos);
        pos.position() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> Header {
        let mut metadata = BTreeMap::new();
        metadata.insert(SCHEMA_KEY.to_string(), br#""int""#.to_vec());
        metadata.insert(CODEC_KEY.to_string(), b"deflate".to_vec());
        metadata.insert("user.bin".to_string(), vec![0, 159, 255]);
        Header { metadata, sync: [7u8; SYNC_SIZE] }
    }

    #[test]
    fn round_trip() {
        let h = header();
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"Obj\x01");
        assert_eq!(&buf[buf.len() - SYNC_SIZE..], &[7u8; SYNC_SIZE]);
        assert_eq!(h.encoded_len(), buf.len());

        let back = Header::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, h);
        assert_eq!(back.codec_name().unwrap(), "deflate");
        assert_eq!(back.schema().unwrap(), Schema::parse_str(r#""int""#).unwrap());
    }

    #[test]
    fn bad_magic() {
        let err = Header::read(&mut Cursor::new(b"Obj\x02rest")).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn missing_entries() {
        let h = Header { metadata: BTreeMap::new(), sync: [0; SYNC_SIZE] };
        assert_eq!(h.codec_name().unwrap(), "null");
        assert!(matches!(h.schema_text(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn truncated_header() {
        let mut buf = Vec::new();
        header().write(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(Header::read(&mut Cursor::new(&buf)).unwrap_err().is_truncated());
    }
}
