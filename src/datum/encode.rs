//! Value → bytes, driven by the writer schema.

use std::io::Write;

use crate::binary::{
    write_boolean, write_bytes, write_double, write_float, write_int, write_long, write_string,
};
use crate::error::{mismatch, Error, Result};
use crate::schema::{NodeId, Schema, SchemaNode};
use crate::value::Value;

use super::Segment;

/// How array and map blocks are framed on write.  Readers accept both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockFraming {
    /// `count | items… | 0`
    #[default]
    Plain,
    /// `-count | byte length | items… | 0`, letting readers skip the block.
    Sized,
}

/// Encodes values under one schema.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    schema:  &'a Schema,
    framing: BlockFraming,
}

impl<'a> Encoder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema, framing: BlockFraming::Plain }
    }

    pub fn with_framing(mut self, framing: BlockFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn schema(&self) -> &'a Schema { self.schema }

    /// Append the encoding of `value` to `out`.  On error `out` is restored
    /// to its previous length.
    pub fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let mut path = Vec::new();
        match self.node(self.schema.root(), value, out, &mut path) {
            Ok(()) => Ok(()),
            Err(e) => {
                let offset = (out.len() - start) as u64;
                out.truncate(start);
                Err(e.with_context(offset, super::render_path(&path)))
            }
        }
    }

    fn node(
        &self,
        id:    NodeId,
        value: &Value,
        out:   &mut Vec<u8>,
        path:  &mut Vec<Segment<'a>>,
    ) -> Result<()> {
        let schema = self.schema;
        match (schema.node(id), value) {
            (SchemaNode::Null, Value::Null) => {}
            (SchemaNode::Boolean, Value::Boolean(b)) => write_boolean(out, *b)?,
            (SchemaNode::Int, Value::Int(n)) => write_int(out, *n)?,
            (SchemaNode::Long, Value::Long(n)) => write_long(out, *n)?,
            (SchemaNode::Float, Value::Float(f)) => write_float(out, *f)?,
            (SchemaNode::Double, Value::Double(f)) => write_double(out, *f)?,
            (SchemaNode::Bytes, Value::Bytes(b)) => write_bytes(out, b)?,
            (SchemaNode::String, Value::String(s)) => write_string(out, s)?,
            (SchemaNode::Fixed { size, name, .. }, Value::Fixed(b)) => {
                if b.len() != *size {
                    return Err(mismatch(format!(
                        "fixed '{name}' needs {size} bytes, value has {}",
                        b.len()
                    )));
                }
                out.write_all(b)?;
            }
            (SchemaNode::Enum { symbols, .. }, Value::Enum(sym)) => {
                let index = symbols
                    .iter()
                    .position(|s| s == sym)
                    .ok_or_else(|| Error::UnknownEnumSymbol(sym.clone()))?;
                write_long(out, index as i64)?;
            }
            (SchemaNode::Array(items), Value::Array(values)) => {
                self.blocks(out, values.len(), |enc, buf| {
                    for (i, v) in values.iter().enumerate() {
                        path.push(Segment::Index(i));
                        enc.node(*items, v, buf, path)?;
                        path.pop();
                    }
                    Ok(())
                })?;
            }
            (SchemaNode::Map(values_schema), Value::Map(entries)) => {
                // Sorted keys keep output reproducible.
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort_unstable();
                self.blocks(out, keys.len(), |enc, buf| {
                    for (i, k) in keys.iter().enumerate() {
                        write_string(buf, k)?;
                        path.push(Segment::Index(i));
                        enc.node(*values_schema, &entries[*k], buf, path)?;
                        path.pop();
                    }
                    Ok(())
                })?;
            }
            (SchemaNode::Union(members), Value::Union(index, inner)) => {
                let member = *members.get(*index).ok_or(Error::UnknownUnionMember {
                    index:   *index,
                    members: members.len(),
                })?;
                write_long(out, *index as i64)?;
                path.push(Segment::Branch(*index));
                self.node(member, inner, out, path)?;
                path.pop();
            }
            (SchemaNode::Record { name, fields, .. }, Value::Record(values)) => {
                let mut used = 0usize;
                for (pos, field) in fields.iter().enumerate() {
                    // Fields are usually given in schema order.
                    let found = match values.get(pos) {
                        Some((n, v)) if *n == field.name => Some(v),
                        _ => values.iter().find(|(n, _)| *n == field.name).map(|(_, v)| v),
                    };
                    let v = match (found, &field.default) {
                        (Some(v), _) => {
                            used += 1;
                            v
                        }
                        (None, Some(d)) => d,
                        (None, None) => {
                            return Err(mismatch(format!(
                                "record '{name}' value has no field '{}'",
                                field.name
                            )))
                        }
                    };
                    path.push(Segment::Field(&field.name));
                    self.node(field.schema, v, out, path)?;
                    path.pop();
                }
                if used != values.len() {
                    let extra = values
                        .iter()
                        .find(|(n, _)| !fields.iter().any(|f| f.name == *n))
                        .map(|(n, _)| n.as_str())
                        .unwrap_or("?");
                    return Err(mismatch(format!("record '{name}' has no field '{extra}'")));
                }
            }
            (node, value) => {
                return Err(mismatch(format!(
                    "{} value cannot be encoded as {}",
                    value.kind(),
                    node.kind()
                )))
            }
        }
        Ok(())
    }

    /// Frame `count` items written by `items` as one block plus terminator.
    fn blocks<F>(&self, out: &mut Vec<u8>, count: usize, items: F) -> Result<()>
    where
        F: FnOnce(&Self, &mut Vec<u8>) -> Result<()>,
    {
        if count > 0 {
            match self.framing {
                BlockFraming::Plain => {
                    write_long(out, count as i64)?;
                    items(self, out)?;
                }
                BlockFraming::Sized => {
                    let mut block = Vec::new();
                    let written = items(self, &mut block);
                    write_long(out, -(count as i64))?;
                    // A partial block still lands in `out` so that error
                    // offsets count its bytes; only the length is missing.
                    if written.is_ok() {
                        write_long(out, block.len() as i64)?;
                    }
                    out.extend_from_slice(&block);
                    written?;
                }
            }
        }
        write_long(out, 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn encode(schema: &str, value: &Value) -> Result<Vec<u8>> {
        let schema = Schema::parse_str(schema).unwrap();
        let mut out = Vec::new();
        Encoder::new(&schema).encode(value, &mut out)?;
        Ok(out)
    }

    #[test]
    fn primitive_layouts() {
        assert_eq!(encode(r#""null""#, &Value::Null).unwrap(), Vec::<u8>::new());
        assert_eq!(encode(r#""boolean""#, &Value::Boolean(true)).unwrap(), [1]);
        assert_eq!(encode(r#""int""#, &Value::Int(42)).unwrap(), [84]);
        assert_eq!(encode(r#""string""#, &"foo".into()).unwrap(), [6, b'f', b'o', b'o']);
        assert_eq!(
            encode(r#"{"type":"fixed","name":"F","size":2}"#, &Value::Fixed(vec![9, 8])).unwrap(),
            [9, 8]
        );
    }

    #[test]
    fn array_block_framing() {
        let schema = Schema::parse_str(r#"{"type":"array","items":"long"}"#).unwrap();
        let value = Value::Array(vec![Value::Long(3), Value::Long(27)]);

        let mut plain = Vec::new();
        Encoder::new(&schema).encode(&value, &mut plain).unwrap();
        assert_eq!(plain, [0x04, 0x06, 0x36, 0x00]);

        let mut sized = Vec::new();
        Encoder::new(&schema)
            .with_framing(BlockFraming::Sized)
            .encode(&value, &mut sized)
            .unwrap();
        assert_eq!(sized, [0x03, 0x04, 0x06, 0x36, 0x00]);

        assert_eq!(encode(r#"{"type":"array","items":"long"}"#, &Value::Array(vec![])).unwrap(), [0]);
    }

    #[test]
    fn union_uses_declared_member() {
        let out = encode(r#"["null","string"]"#, &Value::union(1, "a".into())).unwrap();
        assert_eq!(out, [0x02, 0x02, b'a']);
        let out = encode(r#"["null","string"]"#, &Value::union(0, Value::Null)).unwrap();
        assert_eq!(out, [0x00]);

        let err = encode(r#"["null","string"]"#, &Value::union(5, Value::Null)).unwrap_err();
        assert!(matches!(err.root(), Error::UnknownUnionMember { index: 5, members: 2 }));
        let err = encode(r#"["null","string"]"#, &Value::union(0, "x".into())).unwrap_err();
        assert!(matches!(err.root(), Error::SchemaMismatch(_)));
    }

    #[test]
    fn enum_symbols() {
        let schema = r#"{"type":"enum","name":"E","symbols":["A","B"]}"#;
        assert_eq!(encode(schema, &Value::Enum("B".into())).unwrap(), [2]);
        let err = encode(schema, &Value::Enum("Z".into())).unwrap_err();
        assert!(matches!(err.root(), Error::UnknownEnumSymbol(s) if s == "Z"));
    }

    #[test]
    fn record_errors_carry_a_path() {
        let schema = r#"{"type":"record","name":"R","fields":[
            {"name":"a","type":"int"},
            {"name":"tags","type":{"type":"map","values":"int"}}
        ]}"#;
        let mut tags = HashMap::new();
        tags.insert("k".to_string(), Value::String("oops".into()));
        let value = Value::record([("a", Value::Int(1)), ("tags", Value::Map(tags))]);
        let err = encode(schema, &value).unwrap_err();
        match &err {
            Error::Context { path, .. } => assert_eq!(path, "tags[0]"),
            other => panic!("unexpected {other:?}"),
        }

        let value = Value::record([("a", Value::Int(1)), ("zzz", Value::Int(2))]);
        assert!(encode(schema, &value).is_err());
    }

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let schema = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[
                {"name":"a","type":"int"},{"name":"b","type":"int"}]}"#,
        )
        .unwrap();
        let mut out = vec![0xAA];
        let bad = Value::record([("a", Value::Int(1)), ("b", Value::Long(2))]);
        assert!(Encoder::new(&schema).encode(&bad, &mut out).is_err());
        assert_eq!(out, [0xAA]);
    }

    #[test]
    fn record_fields_fall_back_to_defaults() {
        let schema = r#"{"type":"record","name":"R","fields":[
            {"name":"a","type":"int","default":5},{"name":"b","type":"string"}]}"#;
        let out = encode(schema, &Value::record([("b", Value::from("x"))])).unwrap();
        assert_eq!(out, [10, 2, b'x']);
    }

    #[test]
    fn error_offsets_count_block_contents() {
        let schema = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[
                {"name":"a","type":"int"},
                {"name":"b","type":{"type":"array","items":"int"}}
            ]}"#,
        )
        .unwrap();
        let bad = Value::record([
            ("a", Value::Int(1)),
            ("b", Value::Array(vec![Value::Int(1), Value::from("x")])),
        ]);
        for framing in [BlockFraming::Plain, BlockFraming::Sized] {
            let mut out = vec![0xEE; 5];
            let err = Encoder::new(&schema).with_framing(framing).encode(&bad, &mut out).unwrap_err();
            assert_eq!(out, [0xEE; 5], "{framing:?}");
            match err {
                // a, the block count and b[0] come before the bad item.
                Error::Context { offset, path, .. } => {
                    assert_eq!((offset, path.as_str()), (3, "b[1]"), "{framing:?}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
