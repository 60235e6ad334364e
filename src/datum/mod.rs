//! Single-value binary encoding and decoding.
//!
//! A datum is one value encoded with no framing of its own: the bytes start
//! with the first byte of the value and end with its last.  Writing always
//! follows the writer schema; reading follows a [`ResolvedSchema`] so that a
//! reader schema may differ from the one the bytes were written with.

mod decode;
mod encode;

pub(crate) use decode::decode;
pub use encode::{BlockFraming, Encoder};

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::Result;
use crate::resolve::ResolvedSchema;
use crate::schema::Schema;
use crate::value::Value;

// ── Paths ────────────────────────────────────────────────────────────────────

/// One step of the schema path reported in error context.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Segment<'a> {
    Field(&'a str),
    Index(usize),
    Branch(usize),
}

/// `a.b[3].c`; union branches render as `<n>`.
pub(crate) fn render_path(path: &[Segment<'_>]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            Segment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            Segment::Index(i) => out.push_str(&format!("[{i}]")),
            Segment::Branch(i) => out.push_str(&format!("<{i}>")),
        }
    }
    out
}

// ── Limits ───────────────────────────────────────────────────────────────────

/// Items that encode to zero bytes one decode may produce by default.
pub const DEFAULT_MAX_EMPTY_ITEMS: u64 = 1 << 20;

/// Bounds on what decoding untrusted bytes may build.
///
/// Items that take at least one byte are bounded by the input itself.  Items
/// that take none (`null`, records of nothing but nulls) are not, so a short
/// input could otherwise declare an unbounded number of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Zero-width array items one value may hold, or one container block
    /// may declare.
    pub max_empty_items: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self { max_empty_items: DEFAULT_MAX_EMPTY_ITEMS }
    }
}

// ── One-shot helpers ─────────────────────────────────────────────────────────

/// Encode `value` under `schema`'s root.
pub fn to_datum(schema: &Schema, value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    Encoder::new(schema).encode(value, &mut out)?;
    Ok(out)
}

/// Encode `value` and write it to `sink`.  Nothing is written on error.
pub fn write_datum<W: Write + ?Sized>(schema: &Schema, value: &Value, sink: &mut W) -> Result<()> {
    let bytes = to_datum(schema, value)?;
    sink.write_all(&bytes)?;
    Ok(())
}

/// Decode one value written with `schema`.
pub fn from_datum<R: Read + ?Sized>(schema: &Schema, src: &mut R) -> Result<Value> {
    let resolved = ResolvedSchema::identity(Arc::new(schema.clone()))?;
    decode(&resolved, src, 0, DecodeLimits::default())
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Decodes successive values under a fixed (writer, reader) schema pair.
///
/// Resolution is computed once, on construction; each [`read`] call then
/// only interprets the plan.
///
/// [`read`]: DatumReader::read
#[derive(Debug, Clone)]
pub struct DatumReader {
    resolved: Arc<ResolvedSchema>,
    limits:   DecodeLimits,
}

impl DatumReader {
    /// Read values with the schema they were written with.
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        Ok(Self::from_resolved(Arc::new(ResolvedSchema::identity(schema)?)))
    }

    /// Read values written with `writer` as values of `reader`.
    pub fn with_reader_schema(writer: Arc<Schema>, reader: Arc<Schema>) -> Result<Self> {
        Ok(Self::from_resolved(Arc::new(ResolvedSchema::new(writer, reader)?)))
    }

    /// Share a plan that was already built, e.g. by a container reader.
    pub fn from_resolved(resolved: Arc<ResolvedSchema>) -> Self {
        Self { resolved, limits: DecodeLimits::default() }
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn resolved(&self) -> &Arc<ResolvedSchema> { &self.resolved }

    pub fn read<R: Read + ?Sized>(&self, src: &mut R) -> Result<Value> {
        decode(&self.resolved, src, 0, self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn parse(text: &str) -> Schema {
        Schema::parse_str(text).unwrap()
    }

    fn round_trip(schema: &Schema, value: &Value) -> Value {
        let bytes = to_datum(schema, value).unwrap();
        let mut cur = Cursor::new(&bytes);
        let back = from_datum(schema, &mut cur).unwrap();
        assert_eq!(cur.position() as usize, bytes.len(), "trailing bytes left");
        back
    }

    #[test]
    fn render_paths() {
        let path = [
            Segment::Field("a"),
            Segment::Index(3),
            Segment::Branch(1),
            Segment::Field("c"),
        ];
        assert_eq!(render_path(&path), "a[3]<1>.c");
        assert_eq!(render_path(&[]), "");
    }

    #[test]
    fn every_kind_round_trips() {
        let schema = parse(
            r#"{"type":"record","name":"All","fields":[
                {"name":"n","type":"null"},
                {"name":"b","type":"boolean"},
                {"name":"i","type":"int"},
                {"name":"l","type":"long"},
                {"name":"f","type":"float"},
                {"name":"d","type":"double"},
                {"name":"raw","type":"bytes"},
                {"name":"s","type":"string"},
                {"name":"fx","type":{"type":"fixed","name":"Four","size":4}},
                {"name":"e","type":{"type":"enum","name":"Suit","symbols":["HEART","SPADE"]}},
                {"name":"arr","type":{"type":"array","items":"int"}},
                {"name":"m","type":{"type":"map","values":"string"}},
                {"name":"u","type":["null","Four"]}
            ]}"#,
        );
        let mut m = HashMap::new();
        m.insert("x".to_string(), Value::from("y"));
        m.insert("".to_string(), Value::from(""));
        let value = Value::record([
            ("n", Value::Null),
            ("b", Value::Boolean(false)),
            ("i", Value::Int(i32::MIN)),
            ("l", Value::Long(i64::MAX)),
            ("f", Value::Float(1.5)),
            ("d", Value::Double(-0.25)),
            ("raw", Value::Bytes(vec![0, 255])),
            ("s", Value::from("héllo")),
            ("fx", Value::Fixed(vec![1, 2, 3, 4])),
            ("e", Value::Enum("SPADE".into())),
            ("arr", Value::Array((0..300).map(Value::Int).collect())),
            ("m", Value::Map(m)),
            ("u", Value::union(1, Value::Fixed(vec![9, 9, 9, 9]))),
        ]);
        assert_eq!(round_trip(&schema, &value), value);
    }

    #[test]
    fn recursive_list() {
        let schema = parse(
            r#"{"type":"record","name":"Node","fields":[
                {"name":"v","type":"int"},
                {"name":"next","type":["null","Node"]}
            ]}"#,
        );
        let mut list = Value::record([("v", Value::Int(3)), ("next", Value::union(0, Value::Null))]);
        for v in (0..3).rev() {
            list = Value::record([("v", Value::Int(v)), ("next", Value::union(1, list))]);
        }
        assert_eq!(round_trip(&schema, &list), list);
    }

    #[test]
    fn identity_resolution_matches_plain_decode() {
        let schema = Arc::new(parse(r#"{"type":"map","values":["int","string"]}"#));
        let mut m = HashMap::new();
        m.insert("a".to_string(), Value::union(0, Value::Int(1)));
        m.insert("b".to_string(), Value::union(1, Value::from("two")));
        let value = Value::Map(m);
        let bytes = to_datum(&schema, &value).unwrap();

        let reader = DatumReader::new(Arc::clone(&schema)).unwrap();
        let explicit = DatumReader::with_reader_schema(Arc::clone(&schema), schema).unwrap();
        assert_eq!(reader.read(&mut Cursor::new(&bytes)).unwrap(), value);
        assert_eq!(explicit.read(&mut Cursor::new(&bytes)).unwrap(), value);
    }

    #[test]
    fn int_promotes_to_double() {
        let writer = Arc::new(parse(r#""int""#));
        let reader = Arc::new(parse(r#""double""#));
        let dr = DatumReader::with_reader_schema(writer.clone(), reader).unwrap();
        for n in [0, -1, 7, i32::MAX, i32::MIN] {
            let bytes = to_datum(&writer, &Value::Int(n)).unwrap();
            assert_eq!(dr.read(&mut Cursor::new(&bytes)).unwrap(), Value::Double(f64::from(n)));
        }
    }

    #[test]
    fn record_evolution_skips_and_defaults() {
        let writer = Arc::new(parse(
            r#"{"type":"record","name":"R","fields":[
                {"name":"a","type":"int"},{"name":"b","type":"string"}]}"#,
        ));
        let reader = Arc::new(parse(
            r#"{"type":"record","name":"R","fields":[
                {"name":"b","type":"string"},
                {"name":"c","type":"int","default":7}]}"#,
        ));
        let bytes = to_datum(
            &writer,
            &Value::record([("a", Value::Int(1)), ("b", Value::from("x"))]),
        )
        .unwrap();
        let dr = DatumReader::with_reader_schema(writer, reader).unwrap();
        assert_eq!(
            dr.read(&mut Cursor::new(&bytes)).unwrap(),
            Value::record([("b", Value::from("x")), ("c", Value::Int(7))])
        );
    }

    #[test]
    fn missing_default_is_incompatible() {
        let writer = Arc::new(parse(r#"{"type":"record","name":"R","fields":[]}"#));
        let reader = Arc::new(parse(
            r#"{"type":"record","name":"R","fields":[{"name":"c","type":"int"}]}"#,
        ));
        let err = DatumReader::with_reader_schema(writer, reader).unwrap_err();
        assert!(matches!(err, Error::IncompatibleSchema(_)));
    }

    #[test]
    fn write_datum_writes_nothing_on_error() {
        let schema = parse(r#"{"type":"array","items":"int"}"#);
        let mut sink = Vec::new();
        let bad = Value::Array(vec![Value::Int(1), Value::from("no")]);
        assert!(write_datum(&schema, &bad, &mut sink).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn truncated_datum() {
        let schema = parse(r#""long""#);
        let err = from_datum(&schema, &mut Cursor::new(&[0x80u8, 0x80][..])).unwrap_err();
        assert!(err.is_truncated());
    }
}
