//! JSON schema text ⇄ [`Schema`], and JSON ⇄ [`Value`].
//!
//! The container stores its writer schema as JSON text under `avro.schema`,
//! so the reader needs this module to recover it.  Everything else in the
//! crate works on the parsed arena only.
//!
//! # Emission
//! [`Schema::to_json`] writes every named type in full at its first
//! occurrence and by name at every later one.  A `"namespace"` key is only
//! written where the enclosing namespace differs, `""` standing for the null
//! namespace.  A later occurrence of a null-namespace type inside a
//! namespaced record is written as `{"type": "Name", "namespace": ""}`.
//!
//! # Values
//! Two JSON conventions exist for values:
//! - *default* form (field defaults): a union value is written bare, as a
//!   value of the union's first member;
//! - *tagged* form (data files, CLI): a non-null union value is wrapped as
//!   `{"<member type name>": value}`.
//!
//! Bytes and fixed values are strings whose code points 0–255 are the bytes.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::{json, Map, Number, Value as JsonValue};

use super::{Field, Name, NodeId, Schema, SchemaBuilder, SchemaNode};
use crate::error::{invalid_schema, mismatch, Result};
use crate::value::Value;

/// Read access to schema nodes, shared by the builder (during parsing) and
/// the finished schema.
pub(crate) trait NodeSource {
    fn node_at(&self, id: NodeId) -> &SchemaNode;
}

impl NodeSource for Schema {
    fn node_at(&self, id: NodeId) -> &SchemaNode { self.node(id) }
}

impl NodeSource for SchemaBuilder {
    fn node_at(&self, id: NodeId) -> &SchemaNode { &self.nodes[id.0] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionStyle {
    /// Union values are written as a value of the first member.
    Default,
    /// Union values are `null` or `{"member": value}`.
    Tagged,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

impl Schema {
    pub fn parse_str(text: &str) -> Result<Schema> {
        let json: JsonValue = serde_json::from_str(text)
            .map_err(|e| invalid_schema(format!("schema is not valid JSON: {e}")))?;
        Self::parse(&json)
    }

    pub fn parse(json: &JsonValue) -> Result<Schema> {
        let mut parser = Parser { builder: SchemaBuilder::new(), defaults: Vec::new() };
        let root = parser.parse(json, None)?;

        // Defaults are converted once every named type is fully defined.
        for (record, index, default) in std::mem::take(&mut parser.defaults) {
            let SchemaNode::Record { fields, .. } = parser.builder.node_at(record) else {
                continue;
            };
            let field_schema = fields[index].schema;
            let value = json_to_value(&parser.builder, field_schema, &default, UnionStyle::Default)
                .map_err(|e| invalid_schema(format!("bad default: {e}")))?;
            if let SchemaNode::Record { fields, .. } = &mut parser.builder.nodes[record.0] {
                fields[index].default = Some(value);
            }
        }
        parser.builder.build(root)
    }
}

struct Parser {
    builder:  SchemaBuilder,
    /// (record, field index, raw JSON default)
    defaults: Vec<(NodeId, usize, JsonValue)>,
}

fn primitive(name: &str) -> Option<SchemaNode> {
    Some(match name {
        "null"    => SchemaNode::Null,
        "boolean" => SchemaNode::Boolean,
        "int"     => SchemaNode::Int,
        "long"    => SchemaNode::Long,
        "float"   => SchemaNode::Float,
        "double"  => SchemaNode::Double,
        "bytes"   => SchemaNode::Bytes,
        "string"  => SchemaNode::String,
        _ => return None,
    })
}

fn str_list(json: Option<&JsonValue>) -> Vec<String> {
    json.and_then(JsonValue::as_array)
        .map(|a| a.iter().filter_map(JsonValue::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

impl Parser {
    fn parse(&mut self, json: &JsonValue, ns: Option<&str>) -> Result<NodeId> {
        match json {
            JsonValue::String(s) => self.reference(s, ns),
            JsonValue::Array(members) => {
                let ids = members
                    .iter()
                    .map(|m| self.parse(m, ns))
                    .collect::<Result<Vec<_>>>()?;
                self.builder.add(SchemaNode::Union(ids))
            }
            JsonValue::Object(map) => self.complex(map, ns),
            other => Err(invalid_schema(format!("unexpected schema JSON: {other}"))),
        }
    }

    fn reference(&mut self, name: &str, ns: Option<&str>) -> Result<NodeId> {
        if let Some(node) = primitive(name) {
            return self.builder.add(node);
        }
        let qualified = Name::with_enclosing(name, ns).fullname();
        self.builder
            .lookup(&qualified)
            .or_else(|| self.builder.lookup(name))
            .ok_or_else(|| invalid_schema(format!("unknown type '{name}'")))
    }

    fn complex(&mut self, map: &Map<String, JsonValue>, ns: Option<&str>) -> Result<NodeId> {
        let ty = match map.get("type") {
            Some(JsonValue::String(s)) => s.as_str(),
            Some(nested) => return self.parse(nested, ns),
            None => return Err(invalid_schema("schema object without \"type\"")),
        };
        match ty {
            "record" | "error" => self.record(map, ns),
            "enum" => {
                let name = self.name_of(map, ns)?;
                let aliases = self.aliases_of(map, &name);
                let symbols = map
                    .get("symbols")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| invalid_schema(format!("enum '{name}' has no symbols")))?
                    .iter()
                    .map(|s| {
                        s.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| invalid_schema("enum symbol is not a string"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let default = map.get("default").and_then(JsonValue::as_str).map(str::to_owned);
                let doc = map.get("doc").and_then(JsonValue::as_str).map(str::to_owned);
                self.builder.add(SchemaNode::Enum { name, aliases, doc, symbols, default })
            }
            "fixed" => {
                let name = self.name_of(map, ns)?;
                let aliases = self.aliases_of(map, &name);
                let size = map
                    .get("size")
                    .and_then(JsonValue::as_u64)
                    .ok_or_else(|| invalid_schema(format!("fixed '{name}' has no size")))?;
                self.builder.add(SchemaNode::Fixed { name, aliases, size: size as usize })
            }
            "array" => {
                let items = map
                    .get("items")
                    .ok_or_else(|| invalid_schema("array without \"items\""))?;
                let items = self.parse(items, ns)?;
                self.builder.add(SchemaNode::Array(items))
            }
            "map" => {
                let values = map
                    .get("values")
                    .ok_or_else(|| invalid_schema("map without \"values\""))?;
                let values = self.parse(values, ns)?;
                self.builder.add(SchemaNode::Map(values))
            }
            // {"type": "int"}, {"type": "Named"}; logical types fall through
            // to their underlying type.  An explicit "namespace" qualifies the
            // reference, "" meaning the null namespace.
            other => {
                let explicit = map.get("namespace").and_then(JsonValue::as_str);
                self.reference(other, explicit.or(ns))
            }
        }
    }

    fn record(&mut self, map: &Map<String, JsonValue>, ns: Option<&str>) -> Result<NodeId> {
        let name = self.name_of(map, ns)?;
        let aliases = self.aliases_of(map, &name);
        let doc = map.get("doc").and_then(JsonValue::as_str).map(str::to_owned);
        let inner_ns = name.namespace.clone();
        let id = self.builder.declare_record(name.clone())?;

        let fields_json = map
            .get("fields")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| invalid_schema(format!("record '{name}' has no fields")))?;
        let mut fields = Vec::with_capacity(fields_json.len());
        for (i, f) in fields_json.iter().enumerate() {
            let fname = f
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| invalid_schema(format!("field {i} of '{name}' has no name")))?;
            let fty = f
                .get("type")
                .ok_or_else(|| invalid_schema(format!("field '{fname}' has no type")))?;
            let schema = self.parse(fty, inner_ns.as_deref())?;
            let mut field = Field::new(fname, schema).with_aliases(str_list(f.get("aliases")));
            field.doc = f.get("doc").and_then(JsonValue::as_str).map(str::to_owned);
            if let Some(d) = f.get("default") {
                self.defaults.push((id, i, d.clone()));
            }
            fields.push(field);
        }
        self.builder.define_record_with(id, fields, aliases, doc)?;
        Ok(id)
    }

    fn name_of(&self, map: &Map<String, JsonValue>, ns: Option<&str>) -> Result<Name> {
        let name = map
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| invalid_schema("named type without \"name\""))?;
        let explicit = map.get("namespace").and_then(JsonValue::as_str);
        Ok(Name::with_enclosing(name, explicit.or(ns)))
    }

    fn aliases_of(&self, map: &Map<String, JsonValue>, name: &Name) -> Vec<Name> {
        str_list(map.get("aliases"))
            .iter()
            .map(|a| Name::with_enclosing(a, name.namespace.as_deref()))
            .collect()
    }
}

// ── Emission ─────────────────────────────────────────────────────────────────

impl Schema {
    pub fn to_json(&self) -> JsonValue {
        let mut seen = HashSet::new();
        self.node_json(self.root(), None, &mut seen)
    }

    /// `ns` is the namespace a bare name would be resolved in at this point.
    fn node_json(&self, id: NodeId, ns: Option<&str>, seen: &mut HashSet<NodeId>) -> JsonValue {
        let node = self.node(id);
        if let Some(name) = node.name() {
            if !seen.insert(id) {
                return reference_json(name, ns);
            }
        }
        let aliases = |aliases: &[Name]| -> JsonValue {
            aliases.iter().map(Name::fullname).collect::<Vec<_>>().into()
        };
        match node {
            SchemaNode::Array(items) => json!({"type": "array", "items": self.node_json(*items, ns, seen)}),
            SchemaNode::Map(values) => json!({"type": "map", "values": self.node_json(*values, ns, seen)}),
            SchemaNode::Union(members) => {
                JsonValue::Array(members.iter().map(|m| self.node_json(*m, ns, seen)).collect())
            }
            SchemaNode::Fixed { name, aliases: a, size } => {
                let mut obj = json!({"type": "fixed", "size": size});
                name_json(&mut obj, name, ns);
                if !a.is_empty() {
                    obj["aliases"] = aliases(a);
                }
                obj
            }
            SchemaNode::Enum { name, aliases: a, doc, symbols, default } => {
                let mut obj = json!({"type": "enum", "symbols": symbols});
                name_json(&mut obj, name, ns);
                if !a.is_empty() {
                    obj["aliases"] = aliases(a);
                }
                if let Some(doc) = doc {
                    obj["doc"] = json!(doc);
                }
                if let Some(d) = default {
                    obj["default"] = json!(d);
                }
                obj
            }
            SchemaNode::Record { name, aliases: a, doc, fields } => {
                let inner = name.namespace.as_deref();
                let fields: Vec<JsonValue> = fields
                    .iter()
                    .map(|f| {
                        let mut fj = json!({"name": f.name, "type": self.node_json(f.schema, inner, seen)});
                        if let Some(d) = &f.default {
                            // Defaults were validated against the field schema.
                            if let Ok(dj) = value_to_json(self, f.schema, d, UnionStyle::Default) {
                                fj["default"] = dj;
                            }
                        }
                        if !f.aliases.is_empty() {
                            fj["aliases"] = json!(f.aliases);
                        }
                        if let Some(doc) = &f.doc {
                            fj["doc"] = json!(doc);
                        }
                        fj
                    })
                    .collect();
                let mut obj = json!({"type": "record", "fields": fields});
                name_json(&mut obj, name, ns);
                if !a.is_empty() {
                    obj["aliases"] = aliases(a);
                }
                if let Some(doc) = doc {
                    obj["doc"] = json!(doc);
                }
                obj
            }
            primitive => json!(primitive.kind()),
        }
    }
}

/// Write `"name"`, plus `"namespace"` whenever the enclosing one would not
/// reproduce it (`""` for the null namespace).
fn name_json(obj: &mut JsonValue, name: &Name, ns: Option<&str>) {
    obj["name"] = json!(name.name);
    if name.namespace.as_deref() != ns {
        obj["namespace"] = json!(name.namespace.as_deref().unwrap_or(""));
    }
}

/// A later occurrence of a named type, spelled so that it resolves back to
/// the same type from inside namespace `ns`.
fn reference_json(name: &Name, ns: Option<&str>) -> JsonValue {
    match (name.namespace.as_deref(), ns) {
        (own, enclosing) if own == enclosing => json!(name.name),
        (Some(_), _) => json!(name.fullname()),
        // A bare name would pick up the enclosing namespace.
        (None, Some(_)) => json!({"type": name.name, "namespace": ""}),
        (None, None) => json!(name.name),
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ── Values ───────────────────────────────────────────────────────────────────

/// Name a union member is tagged with in [`UnionStyle::Tagged`] JSON.
fn branch_name(node: &SchemaNode) -> String {
    match node.name() {
        Some(name) => name.fullname(),
        None       => node.kind().to_owned(),
    }
}

fn latin1(json: &JsonValue) -> Result<Vec<u8>> {
    let s = json.as_str().ok_or_else(|| mismatch("expected a string of byte code points"))?;
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| mismatch(format!("code point {c:?} is not a byte"))))
        .collect()
}

fn latin1_string(bytes: &[u8]) -> JsonValue {
    JsonValue::String(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Non-finite floats have no JSON number form and travel as strings.
fn float_json(f: f64) -> JsonValue {
    match Number::from_f64(f) {
        Some(n) => JsonValue::Number(n),
        None if f.is_nan() => json!("NaN"),
        None if f > 0.0    => json!("Infinity"),
        None               => json!("-Infinity"),
    }
}

fn json_float(json: &JsonValue) -> Option<f64> {
    match json {
        JsonValue::String(s) => match s.as_str() {
            "NaN"       => Some(f64::NAN),
            "Infinity"  => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        other => other.as_f64(),
    }
}

/// Convert JSON to a [`Value`] shaped by node `id` of `schema`.
pub fn value_from_json(schema: &Schema, id: NodeId, json: &JsonValue, style: UnionStyle) -> Result<Value> {
    json_to_value(schema, id, json, style)
}

pub(crate) fn json_to_value<S: NodeSource>(
    schema: &S,
    id:     NodeId,
    json:   &JsonValue,
    style:  UnionStyle,
) -> Result<Value> {
    let node = schema.node_at(id);
    let want = |what: &str| mismatch(format!("expected {what}, got {json}"));
    Ok(match node {
        SchemaNode::Null => match json {
            JsonValue::Null => Value::Null,
            _ => return Err(want("null")),
        },
        SchemaNode::Boolean => Value::Boolean(json.as_bool().ok_or_else(|| want("boolean"))?),
        SchemaNode::Int => {
            let n = json.as_i64().ok_or_else(|| want("int"))?;
            Value::Int(i32::try_from(n).map_err(|_| want("32-bit int"))?)
        }
        SchemaNode::Long => Value::Long(json.as_i64().ok_or_else(|| want("long"))?),
        SchemaNode::Float => Value::Float(json_float(json).ok_or_else(|| want("float"))? as f32),
        SchemaNode::Double => Value::Double(json_float(json).ok_or_else(|| want("double"))?),
        SchemaNode::Bytes => Value::Bytes(latin1(json)?),
        SchemaNode::String => Value::String(json.as_str().ok_or_else(|| want("string"))?.to_owned()),
        SchemaNode::Fixed { size, name, .. } => {
            let bytes = latin1(json)?;
            if bytes.len() != *size {
                return Err(mismatch(format!("fixed '{name}' needs {size} bytes, got {}", bytes.len())));
            }
            Value::Fixed(bytes)
        }
        SchemaNode::Enum { symbols, name, .. } => {
            let s = json.as_str().ok_or_else(|| want("enum symbol"))?;
            if !symbols.iter().any(|sym| sym == s) {
                return Err(mismatch(format!("'{s}' is not a symbol of enum '{name}'")));
            }
            Value::Enum(s.to_owned())
        }
        SchemaNode::Array(items) => {
            let arr = json.as_array().ok_or_else(|| want("array"))?;
            Value::Array(
                arr.iter()
                    .map(|j| json_to_value(schema, *items, j, style))
                    .collect::<Result<_>>()?,
            )
        }
        SchemaNode::Map(values) => {
            let obj = json.as_object().ok_or_else(|| want("object"))?;
            let mut out = HashMap::with_capacity(obj.len());
            for (k, j) in obj {
                out.insert(k.clone(), json_to_value(schema, *values, j, style)?);
            }
            Value::Map(out)
        }
        SchemaNode::Union(members) => match style {
            UnionStyle::Default => {
                let first = *members.first().ok_or_else(|| mismatch("empty union"))?;
                Value::Union(0, Box::new(json_to_value(schema, first, json, style)?))
            }
            UnionStyle::Tagged => {
                if json.is_null() {
                    let idx = members
                        .iter()
                        .position(|m| matches!(schema.node_at(*m), SchemaNode::Null))
                        .ok_or_else(|| mismatch("null given for a union without a null member"))?;
                    Value::Union(idx, Box::new(Value::Null))
                } else {
                    let obj = json.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
                        want("single-key object naming the union member")
                    })?;
                    let (tag, inner) = obj.iter().next().ok_or_else(|| want("union member"))?;
                    let idx = members
                        .iter()
                        .position(|m| {
                            let n = schema.node_at(*m);
                            branch_name(n) == *tag || n.name().is_some_and(|nm| nm.name == *tag)
                        })
                        .ok_or_else(|| mismatch(format!("union has no member '{tag}'")))?;
                    Value::Union(idx, Box::new(json_to_value(schema, members[idx], inner, style)?))
                }
            }
        },
        SchemaNode::Record { fields, name, .. } => {
            let obj = json.as_object().ok_or_else(|| want("object"))?;
            let mut out = Vec::with_capacity(fields.len());
            for f in fields {
                let v = match obj.get(&f.name) {
                    Some(j) => json_to_value(schema, f.schema, j, style)?,
                    None => f.default.clone().ok_or_else(|| {
                        mismatch(format!("record '{name}' is missing field '{}'", f.name))
                    })?,
                };
                out.push((f.name.clone(), v));
            }
            Value::Record(out)
        }
    })
}

/// Render `value` (shaped by node `id`) as JSON.
pub fn value_to_json(schema: &Schema, id: NodeId, value: &Value, style: UnionStyle) -> Result<JsonValue> {
    let node = schema.node(id);
    Ok(match (node, value) {
        (_, Value::Null) => JsonValue::Null,
        (_, Value::Boolean(b)) => json!(b),
        (_, Value::Int(n)) => json!(n),
        (_, Value::Long(n)) => json!(n),
        (_, Value::Float(f)) => float_json(f64::from(*f)),
        (_, Value::Double(f)) => float_json(*f),
        (_, Value::Bytes(b)) | (_, Value::Fixed(b)) => latin1_string(b),
        (_, Value::String(s)) | (_, Value::Enum(s)) => json!(s),
        (SchemaNode::Array(items), Value::Array(vs)) => JsonValue::Array(
            vs.iter()
                .map(|v| value_to_json(schema, *items, v, style))
                .collect::<Result<_>>()?,
        ),
        (SchemaNode::Map(values), Value::Map(m)) => {
            let mut obj = Map::new();
            for (k, v) in m {
                obj.insert(k.clone(), value_to_json(schema, *values, v, style)?);
            }
            JsonValue::Object(obj)
        }
        (SchemaNode::Union(members), Value::Union(i, inner)) => {
            let member = *members
                .get(*i)
                .ok_or_else(|| mismatch(format!("union member {i} out of range")))?;
            let rendered = value_to_json(schema, member, inner, style)?;
            match style {
                UnionStyle::Tagged if !inner.is_null() => {
                    let mut obj = Map::new();
                    obj.insert(branch_name(schema.node(member)), rendered);
                    JsonValue::Object(obj)
                }
                _ => rendered,
            }
        }
        (SchemaNode::Record { fields, .. }, Value::Record(vs)) => {
            let mut obj = Map::new();
            for f in fields {
                if let Some((_, v)) = vs.iter().find(|(n, _)| *n == f.name) {
                    obj.insert(f.name.clone(), value_to_json(schema, f.schema, v, style)?);
                }
            }
            JsonValue::Object(obj)
        }
        (node, value) => {
            return Err(mismatch(format!("{} value under {} schema", value.kind(), node.kind())))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = r#"{
        "type": "record", "name": "User", "namespace": "org.example",
        "aliases": ["Person"],
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "name", "type": "string", "aliases": ["fullName"]},
            {"name": "email", "type": ["null", "string"], "default": null},
            {"name": "kind", "type": {"type": "enum", "name": "Kind",
                                      "symbols": ["ADMIN", "GUEST"], "default": "GUEST"}},
            {"name": "key", "type": {"type": "fixed", "name": "Key", "size": 2},
             "default": "ÿ\u0001"},
            {"name": "tags", "type": {"type": "map", "values": "Kind"}, "default": {}},
            {"name": "friends", "type": {"type": "array", "items": "User"}, "default": []}
        ]
    }"#;

    #[test]
    fn parses_named_types_and_namespaces() {
        let schema = Schema::parse_str(USER).unwrap();
        let user = schema.lookup("org.example.User").unwrap();
        assert_eq!(user, schema.root());
        assert!(schema.lookup("org.example.Kind").is_some());
        assert!(schema.lookup("org.example.Key").is_some());

        let SchemaNode::Record { fields, aliases, .. } = schema.root_node() else {
            panic!("root is not a record");
        };
        assert_eq!(aliases[0].fullname(), "org.example.Person");
        assert_eq!(fields[1].aliases, vec!["fullName".to_string()]);
        assert_eq!(fields[2].default, Some(Value::union(0, Value::Null)));
        assert_eq!(fields[4].default, Some(Value::Fixed(vec![0xff, 0x01])));

        // "friends" items point back at the record itself.
        match schema.node(fields[6].schema) {
            SchemaNode::Array(items) => assert_eq!(*items, user),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn emitted_json_parses_to_the_same_schema() {
        let schema = Schema::parse_str(USER).unwrap();
        let text = schema.to_string();
        let again = Schema::parse_str(&text).unwrap();
        assert_eq!(again.to_json(), schema.to_json());
        assert_eq!(again.len(), schema.len());
    }

    #[test]
    fn null_namespace_types_keep_their_namespace() {
        let text = r#"{
            "type": "record", "name": "User", "namespace": "org.example",
            "fields": [
                {"name": "a", "type": {"type": "fixed", "name": "Inner", "namespace": "", "size": 1}},
                {"name": "b", "type": {"type": "fixed", "name": "Inner", "size": 2}},
                {"name": "c", "type": "Inner"},
                {"name": "d", "type": {"type": "Inner", "namespace": ""}},
                {"name": "e", "type": {"type": "enum", "name": "Kind", "namespace": "",
                                       "symbols": ["A", "B"]}},
                {"name": "f", "type": ["null", "Kind"]}
            ]
        }"#;
        let schema = Schema::parse_str(text).unwrap();
        let bare = schema.lookup("Inner").unwrap();
        let qualified = schema.lookup("org.example.Inner").unwrap();
        assert_ne!(bare, qualified);
        assert!(schema.lookup("Kind").is_some());
        assert!(schema.lookup("org.example.Kind").is_none());

        let again = Schema::parse_str(&schema.to_string()).unwrap();
        assert_eq!(again, schema);
        let SchemaNode::Record { fields, .. } = again.root_node() else {
            panic!("root is not a record");
        };
        let ids: Vec<NodeId> = fields.iter().take(4).map(|f| f.schema).collect();
        assert_eq!(ids, [bare, qualified, qualified, bare]);
    }

    #[test]
    fn emits_namespace_only_where_it_changes() {
        let schema = Schema::parse_str(USER).unwrap();
        let json = schema.to_json();
        assert_eq!(json["name"], "User");
        assert_eq!(json["namespace"], "org.example");
        let kind = &json["fields"][3]["type"];
        assert_eq!(kind["name"], "Kind");
        assert!(kind.get("namespace").is_none());
        // Later occurrences of the same type are bare names.
        assert_eq!(json["fields"][5]["type"]["values"], "Kind");
    }

    #[test]
    fn non_finite_float_defaults_survive_emission() {
        let text = r#"{"type": "record", "name": "R", "fields": [
            {"name": "x", "type": "double", "default": "NaN"},
            {"name": "y", "type": "float", "default": "-Infinity"},
            {"name": "z", "type": "double", "default": "Infinity"}
        ]}"#;
        let schema = Schema::parse_str(text).unwrap();
        let again = Schema::parse_str(&schema.to_string()).unwrap();
        let SchemaNode::Record { fields, .. } = again.root_node() else {
            panic!("root is not a record");
        };
        assert!(matches!(fields[0].default, Some(Value::Double(d)) if d.is_nan()));
        assert_eq!(fields[1].default, Some(Value::Float(f32::NEG_INFINITY)));
        assert_eq!(fields[2].default, Some(Value::Double(f64::INFINITY)));
        assert!(Schema::parse_str(r#"{"type":"record","name":"R","fields":[
            {"name":"x","type":"double","default":"inf"}]}"#).is_err());
    }

    #[test]
    fn primitive_forms() {
        assert_eq!(Schema::parse_str(r#""string""#).unwrap().root_node(), &SchemaNode::String);
        assert_eq!(Schema::parse_str(r#"{"type":"int"}"#).unwrap().root_node(), &SchemaNode::Int);
        assert_eq!(Schema::parse_str(r#""string""#).unwrap().to_string(), r#""string""#);
    }

    #[test]
    fn rejects_bad_schemas() {
        assert!(Schema::parse_str(r#""Nope""#).is_err());
        assert!(Schema::parse_str(r#"["int", ["null"]]"#).is_err());
        assert!(Schema::parse_str(r#"{"type":"fixed","name":"F","size":0}"#).is_err());
        assert!(Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int","default":"x"}]}"#
        )
        .is_err());
        assert!(Schema::parse_str("{not json").is_err());
    }

    #[test]
    fn tagged_union_values() {
        let schema = Schema::parse_str(r#"["null", "string", {"type":"enum","name":"E","symbols":["A"]}]"#)
            .unwrap();
        let root = schema.root();

        let v = value_from_json(&schema, root, &json!({"string": "hi"}), UnionStyle::Tagged).unwrap();
        assert_eq!(v, Value::union(1, "hi".into()));
        let v = value_from_json(&schema, root, &json!({"E": "A"}), UnionStyle::Tagged).unwrap();
        assert_eq!(v, Value::union(2, Value::Enum("A".into())));
        let v = value_from_json(&schema, root, &JsonValue::Null, UnionStyle::Tagged).unwrap();
        assert_eq!(v, Value::union(0, Value::Null));

        let j = value_to_json(&schema, root, &Value::union(1, "hi".into()), UnionStyle::Tagged).unwrap();
        assert_eq!(j, json!({"string": "hi"}));
        let j = value_to_json(&schema, root, &Value::union(0, Value::Null), UnionStyle::Tagged).unwrap();
        assert_eq!(j, JsonValue::Null);
    }

    #[test]
    fn missing_record_fields_take_defaults() {
        let schema = Schema::parse_str(USER).unwrap();
        let v = value_from_json(
            &schema,
            schema.root(),
            &json!({"id": 7, "name": "ann", "kind": "ADMIN"}),
            UnionStyle::Tagged,
        )
        .unwrap();
        assert_eq!(v.field("email"), Some(&Value::union(0, Value::Null)));
        assert_eq!(v.field("friends"), Some(&Value::Array(vec![])));
        assert!(v.validate(&schema));
    }
}
