//! The schema-typed value model.
//!
//! A [`Value`] mirrors the shape of a schema node exactly: a union value
//! carries the index of the member it was written under, a record carries its
//! fields in order, an enum carries its symbol.

use std::collections::HashMap;

use crate::schema::{NodeId, Schema, SchemaNode};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),
    Enum(String),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Member index within the union, then the value under that member.
    Union(usize, Box<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn union(index: usize, value: Value) -> Self {
        Value::Union(index, Box::new(value))
    }

    /// Field of a record value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// True for `Null` and for a union whose selected member holds `Null`.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Union(_, inner) => inner.is_null(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null       => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_)     => "int",
            Value::Long(_)    => "long",
            Value::Float(_)   => "float",
            Value::Double(_)  => "double",
            Value::Bytes(_)   => "bytes",
            Value::String(_)  => "string",
            Value::Fixed(_)   => "fixed",
            Value::Enum(_)    => "enum",
            Value::Array(_)   => "array",
            Value::Map(_)     => "map",
            Value::Union(..)  => "union",
            Value::Record(_)  => "record",
        }
    }

    /// Whether this value can be encoded under the root of `schema`.
    pub fn validate(&self, schema: &Schema) -> bool {
        self.conforms(schema, schema.root())
    }

    pub(crate) fn conforms(&self, schema: &Schema, id: NodeId) -> bool {
        match (schema.node(id), self) {
            (SchemaNode::Null, Value::Null)
            | (SchemaNode::Boolean, Value::Boolean(_))
            | (SchemaNode::Int, Value::Int(_))
            | (SchemaNode::Long, Value::Long(_))
            | (SchemaNode::Float, Value::Float(_))
            | (SchemaNode::Double, Value::Double(_))
            | (SchemaNode::Bytes, Value::Bytes(_))
            | (SchemaNode::String, Value::String(_)) => true,
            (SchemaNode::Fixed { size, .. }, Value::Fixed(b)) => b.len() == *size,
            (SchemaNode::Enum { symbols, .. }, Value::Enum(s)) => symbols.contains(s),
            (SchemaNode::Array(items), Value::Array(vs)) => {
                vs.iter().all(|v| v.conforms(schema, *items))
            }
            (SchemaNode::Map(values), Value::Map(m)) => {
                m.values().all(|v| v.conforms(schema, *values))
            }
            (SchemaNode::Union(members), Value::Union(i, v)) => {
                members.get(*i).is_some_and(|m| v.conforms(schema, *m))
            }
            (SchemaNode::Record { fields, .. }, Value::Record(vs)) => {
                fields.iter().all(|f| match vs.iter().find(|(n, _)| *n == f.name) {
                    Some((_, v)) => v.conforms(schema, f.schema),
                    None => f.default.is_some(),
                })
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Boolean(b) }
}
impl From<i32> for Value {
    fn from(n: i32) -> Self { Value::Int(n) }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Long(n) }
}
impl From<f32> for Value {
    fn from(n: f32) -> Self { Value::Float(n) }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Double(n) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self { Value::Bytes(b) }
}
