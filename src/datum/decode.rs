//! Bytes → value, driven by a resolution plan.

use std::collections::HashMap;
use std::io::Read;

use crate::binary::{
    read_boolean, read_bytes, read_double, read_exact_vec, read_float, read_int, read_len,
    read_long, read_string, skip_exact, Position,
};
use crate::error::{incompatible, mismatch, Result};
use crate::resolve::{Branch, FieldStep, Plan, PlanId, Promotion, ResolvedSchema};
use crate::schema::{NodeId, Schema, SchemaNode};
use crate::value::Value;

use super::{DecodeLimits, Segment};

/// Decode one value from `src`.  `base` is the offset reported in error
/// context for the first byte read.
pub(crate) fn decode<R: Read + ?Sized>(
    resolved: &ResolvedSchema,
    src:      &mut R,
    base:     u64,
    limits:   DecodeLimits,
) -> Result<Value> {
    let mut walk = Walk {
        src:         Position::starting_at(src, base),
        plans:       resolved.plans(),
        writer:      resolved.writer().as_ref(),
        path:        Vec::new(),
        limits,
        empty_items: 0,
    };
    match walk.value(resolved.root()) {
        Ok(v) => Ok(v),
        Err(e) => {
            let offset = walk.src.position();
            Err(e.with_context(offset, super::render_path(&walk.path)))
        }
    }
}

struct Walk<'s, R: Read + ?Sized> {
    src:         Position<&'s mut R>,
    plans:       &'s [Plan],
    writer:      &'s Schema,
    path:        Vec<Segment<'s>>,
    limits:      DecodeLimits,
    /// Zero-width items declared so far, across every array of the value.
    empty_items: u64,
}

impl<'s, R: Read + ?Sized> Walk<'s, R> {
    fn value(&mut self, id: PlanId) -> Result<Value> {
        let plans = self.plans;
        Ok(match &plans[id.0] {
            Plan::Null    => Value::Null,
            Plan::Boolean => Value::Boolean(read_boolean(&mut self.src)?),
            Plan::Int     => Value::Int(read_int(&mut self.src)?),
            Plan::Long    => Value::Long(read_long(&mut self.src)?),
            Plan::Float   => Value::Float(read_float(&mut self.src)?),
            Plan::Double  => Value::Double(read_double(&mut self.src)?),
            Plan::Bytes   => Value::Bytes(read_bytes(&mut self.src)?),
            Plan::String  => Value::String(read_string(&mut self.src)?),
            Plan::Promote(p) => self.promote(*p)?,
            Plan::Fixed(size) => Value::Fixed(read_exact_vec(&mut self.src, *size)?),
            Plan::Enum { symbols } => {
                let index = read_long(&mut self.src)?;
                let symbol = usize::try_from(index)
                    .ok()
                    .and_then(|i| symbols.get(i))
                    .ok_or_else(|| {
                        mismatch(format!("enum index {index} out of range ({} symbols)", symbols.len()))
                    })?;
                Value::Enum(symbol.clone())
            }
            Plan::Array(items) => {
                let mut out = Vec::new();
                self.blocks(|walk, i| {
                    walk.path.push(Segment::Index(i));
                    out.push(walk.value(*items)?);
                    walk.path.pop();
                    Ok(())
                })?;
                Value::Array(out)
            }
            Plan::Map(values) => {
                let mut out = HashMap::new();
                self.blocks(|walk, i| {
                    let key = read_string(&mut walk.src)?;
                    walk.path.push(Segment::Index(i));
                    let v = walk.value(*values)?;
                    walk.path.pop();
                    out.insert(key, v);
                    Ok(())
                })?;
                Value::Map(out)
            }
            Plan::Record { steps, defaults, names } => {
                let mut slots: Vec<Option<Value>> = vec![None; names.len()];
                for step in steps {
                    match step {
                        FieldStep::Read { reader_pos, plan } => {
                            self.path.push(Segment::Field(names[*reader_pos].as_str()));
                            slots[*reader_pos] = Some(self.value(*plan)?);
                            self.path.pop();
                        }
                        FieldStep::Skip { name, writer } => {
                            self.path.push(Segment::Field(name.as_str()));
                            self.skip(*writer)?;
                            self.path.pop();
                        }
                    }
                }
                for (pos, default) in defaults {
                    slots[*pos] = Some(default.clone());
                }
                let fields = names
                    .iter()
                    .zip(slots)
                    .map(|(name, slot)| {
                        slot.map(|v| (name.clone(), v))
                            .ok_or_else(|| mismatch(format!("field '{name}' was never filled")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Record(fields)
            }
            Plan::WriterUnion { branches } => {
                let index = read_long(&mut self.src)?;
                let branch = usize::try_from(index)
                    .ok()
                    .and_then(|i| branches.get(i))
                    .ok_or_else(|| {
                        mismatch(format!(
                            "union index {index} out of range ({} members)",
                            branches.len()
                        ))
                    })?;
                self.path.push(Segment::Branch(index as usize));
                let v = match branch {
                    Branch::To { reader_index: Some(ri), plan } => {
                        Value::Union(*ri, Box::new(self.value(*plan)?))
                    }
                    Branch::To { reader_index: None, plan } => self.value(*plan)?,
                    Branch::Unmatched { writer_kind } => {
                        return Err(incompatible(format!(
                            "writer union member {index} ({writer_kind}) has no reader counterpart"
                        )))
                    }
                };
                self.path.pop();
                v
            }
            Plan::ReaderUnion { index, plan } => Value::Union(*index, Box::new(self.value(*plan)?)),
        })
    }

    fn promote(&mut self, p: Promotion) -> Result<Value> {
        Ok(match p {
            Promotion::IntToLong     => Value::Long(i64::from(read_int(&mut self.src)?)),
            Promotion::IntToFloat    => Value::Float(read_int(&mut self.src)? as f32),
            Promotion::IntToDouble   => Value::Double(f64::from(read_int(&mut self.src)?)),
            Promotion::LongToFloat   => Value::Float(read_long(&mut self.src)? as f32),
            Promotion::LongToDouble  => Value::Double(read_long(&mut self.src)? as f64),
            Promotion::FloatToDouble => Value::Double(f64::from(read_float(&mut self.src)?)),
        })
    }

    /// Walk array/map blocks, calling `each` with a running item index.
    fn blocks<F>(&mut self, mut each: F) -> Result<()>
    where
        F: FnMut(&mut Self, usize) -> Result<()>,
    {
        let mut index = 0usize;
        loop {
            let count = read_long(&mut self.src)?;
            if count == 0 {
                return Ok(());
            }
            if count < 0 {
                // Byte size of the block; not needed when decoding items.
                read_len(&mut self.src)?;
            }
            let count = count.unsigned_abs();
            let mut charged = false;
            for _ in 0..count {
                let before = self.src.position();
                each(self, index)?;
                index += 1;
                // Items of one block share a schema, so if one took no bytes
                // none of them do.
                if !charged && self.src.position() == before {
                    charged = true;
                    self.charge_empty(count)?;
                }
            }
        }
    }

    fn charge_empty(&mut self, count: u64) -> Result<()> {
        self.empty_items = self.empty_items.saturating_add(count);
        if self.empty_items > self.limits.max_empty_items {
            return Err(mismatch(format!(
                "{} zero-width items exceed the limit of {}",
                self.empty_items, self.limits.max_empty_items
            )));
        }
        Ok(())
    }

    /// Consume a value of writer node `id` without building it.
    fn skip(&mut self, id: NodeId) -> Result<()> {
        let writer = self.writer;
        match writer.node(id) {
            SchemaNode::Null => {}
            SchemaNode::Boolean => {
                read_boolean(&mut self.src)?;
            }
            SchemaNode::Int => {
                read_int(&mut self.src)?;
            }
            SchemaNode::Long | SchemaNode::Enum { .. } => {
                read_long(&mut self.src)?;
            }
            SchemaNode::Float => skip_exact(&mut self.src, 4)?,
            SchemaNode::Double => skip_exact(&mut self.src, 8)?,
            SchemaNode::Bytes | SchemaNode::String => {
                let len = read_len(&mut self.src)?;
                skip_exact(&mut self.src, len as u64)?;
            }
            SchemaNode::Fixed { size, .. } => skip_exact(&mut self.src, *size as u64)?,
            SchemaNode::Array(items) => self.skip_blocks(|walk| walk.skip(*items))?,
            SchemaNode::Map(values) => self.skip_blocks(|walk| {
                let len = read_len(&mut walk.src)?;
                skip_exact(&mut walk.src, len as u64)?;
                walk.skip(*values)
            })?,
            SchemaNode::Union(members) => {
                let index = read_long(&mut self.src)?;
                let member = usize::try_from(index)
                    .ok()
                    .and_then(|i| members.get(i))
                    .ok_or_else(|| {
                        mismatch(format!("union index {index} out of range ({} members)", members.len()))
                    })?;
                self.skip(*member)?;
            }
            SchemaNode::Record { fields, .. } => {
                for f in fields {
                    self.skip(f.schema)?;
                }
            }
        }
        Ok(())
    }

    /// Skip array/map blocks; sized blocks are skipped by byte length.
    fn skip_blocks<F>(&mut self, mut each: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        loop {
            let count = read_long(&mut self.src)?;
            if count == 0 {
                return Ok(());
            }
            if count < 0 {
                let size = read_len(&mut self.src)?;
                skip_exact(&mut self.src, size as u64)?;
                continue;
            }
            let mut charged = false;
            for _ in 0..count {
                let before = self.src.position();
                each(self)?;
                if !charged && self.src.position() == before {
                    charged = true;
                    self.charge_empty(count as u64)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::encode::{BlockFraming, Encoder};
    use crate::error::Error;
    use std::io::Cursor;
    use std::sync::Arc;

    fn schema(text: &str) -> Arc<Schema> {
        Arc::new(Schema::parse_str(text).unwrap())
    }

    fn write(schema: &Schema, value: &Value, framing: BlockFraming) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::new(schema).with_framing(framing).encode(value, &mut out).unwrap();
        out
    }

    #[test]
    fn sized_blocks_decode_and_skip() {
        let w = schema(
            r#"{"type":"record","name":"R","fields":[
                {"name":"junk","type":{"type":"array","items":"string"}},
                {"name":"keep","type":"int"}
            ]}"#,
        );
        let r = schema(r#"{"type":"record","name":"R","fields":[{"name":"keep","type":"int"}]}"#);
        let value = Value::record([
            ("junk", Value::Array(vec!["a".into(), "bb".into()])),
            ("keep", Value::Int(9)),
        ]);
        for framing in [BlockFraming::Plain, BlockFraming::Sized] {
            let bytes = write(&w, &value, framing);
            let same = ResolvedSchema::identity(Arc::clone(&w)).unwrap();
            assert_eq!(decode(&same, &mut Cursor::new(&bytes), 0, DecodeLimits::default()).unwrap(), value);

            let evolved = ResolvedSchema::new(Arc::clone(&w), Arc::clone(&r)).unwrap();
            let got = decode(&evolved, &mut Cursor::new(&bytes), 0, DecodeLimits::default()).unwrap();
            assert_eq!(got, Value::record([("keep", Value::Int(9))]));
        }
    }

    #[test]
    fn out_of_range_indexes_are_mismatches() {
        let s = schema(r#"["null","int"]"#);
        let plan = ResolvedSchema::identity(s).unwrap();
        let err = decode(&plan, &mut Cursor::new(&[0x06u8][..]), 0, DecodeLimits::default()).unwrap_err();
        assert!(matches!(err.root(), Error::SchemaMismatch(_)));

        let s = schema(r#"{"type":"enum","name":"E","symbols":["A"]}"#);
        let plan = ResolvedSchema::identity(s).unwrap();
        let err = decode(&plan, &mut Cursor::new(&[0x02u8][..]), 0, DecodeLimits::default()).unwrap_err();
        assert!(matches!(err.root(), Error::SchemaMismatch(_)));
    }

    #[test]
    fn unmatched_writer_branch_fails_only_when_used() {
        let w = schema(r#"["null","int"]"#);
        let r = schema(r#""long""#);
        let plan = ResolvedSchema::new(w, r).unwrap();
        let got = decode(&plan, &mut Cursor::new(&[0x02u8, 0x54][..]), 0, DecodeLimits::default());
        assert_eq!(got.unwrap(), Value::Long(42));
        let err = decode(&plan, &mut Cursor::new(&[0x00u8][..]), 0, DecodeLimits::default()).unwrap_err();
        assert!(err.is_incompatible());
    }

    #[test]
    fn errors_report_offset_and_path() {
        let s = schema(
            r#"{"type":"record","name":"R","fields":[
                {"name":"a","type":"int"},
                {"name":"b","type":{"type":"array","items":"boolean"}}
            ]}"#,
        );
        let plan = ResolvedSchema::identity(s).unwrap();
        // a = 1, b = [true, <bad byte>]
        let bytes = [0x02, 0x04, 0x01, 0x07, 0x00];
        let err = decode(&plan, &mut Cursor::new(&bytes[..]), 100, DecodeLimits::default()).unwrap_err();
        match err {
            Error::Context { offset, path, source } => {
                assert_eq!(offset, 104);
                assert_eq!(path, "b[1]");
                assert!(matches!(*source, Error::MalformedBoolean(7)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_input() {
        let s = schema(r#"{"type":"record","name":"R","fields":[{"name":"s","type":"string"}]}"#);
        let plan = ResolvedSchema::identity(s).unwrap();
        let err = decode(&plan, &mut Cursor::new(&[0x0a, b'a'][..]), 0, DecodeLimits::default()).unwrap_err();
        assert!(err.is_truncated());
    }

    fn huge_count(items: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        crate::binary::write_long(&mut bytes, 1 << 62).unwrap();
        bytes.extend_from_slice(items.as_bytes());
        bytes.push(0);
        bytes
    }

    #[test]
    fn declared_empty_items_are_bounded() {
        let plan = ResolvedSchema::identity(schema(r#"{"type":"array","items":"null"}"#)).unwrap();
        let bytes = huge_count("");
        let err = decode(&plan, &mut Cursor::new(&bytes), 0, DecodeLimits::default()).unwrap_err();
        assert!(matches!(err.root(), Error::SchemaMismatch(_)));

        // Skipped writer fields are bounded the same way.
        let w = schema(
            r#"{"type":"record","name":"R","fields":[
                {"name":"junk","type":{"type":"array","items":"null"}},
                {"name":"keep","type":"int"}
            ]}"#,
        );
        let r = schema(r#"{"type":"record","name":"R","fields":[{"name":"keep","type":"int"}]}"#);
        let plan = ResolvedSchema::new(w, r).unwrap();
        let err = decode(&plan, &mut Cursor::new(&bytes), 0, DecodeLimits::default()).unwrap_err();
        match err {
            Error::Context { path, source, .. } => {
                assert_eq!(path, "junk");
                assert!(matches!(*source, Error::SchemaMismatch(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_item_limit_is_configurable() {
        let plan = ResolvedSchema::identity(schema(r#"{"type":"array","items":"null"}"#)).unwrap();
        // Three nulls.
        let bytes = [0x06, 0x00];
        let three = DecodeLimits { max_empty_items: 3 };
        let got = decode(&plan, &mut Cursor::new(&bytes[..]), 0, three).unwrap();
        assert_eq!(got, Value::Array(vec![Value::Null; 3]));
        let two = DecodeLimits { max_empty_items: 2 };
        assert!(decode(&plan, &mut Cursor::new(&bytes[..]), 0, two).is_err());
    }

    #[test]
    fn huge_count_of_sized_items_runs_out_of_input() {
        let plan = ResolvedSchema::identity(schema(r#"{"type":"array","items":"int"}"#)).unwrap();
        let bytes = huge_count("\x02\x04");
        let err = decode(&plan, &mut Cursor::new(&bytes), 0, DecodeLimits::default()).unwrap_err();
        assert!(err.is_truncated());
    }
}
