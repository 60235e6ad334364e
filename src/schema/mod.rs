//! Schema model: an immutable arena of schema nodes.
//!
//! # Arena
//! Every node lives in [`Schema::nodes`] and is addressed by a [`NodeId`].
//! Composite nodes (array, map, union, record fields) hold ids, never nested
//! nodes, so a record that refers to itself is an id pointing back at its own
//! slot rather than an infinite tree.
//!
//! # Named types
//! Records, enums and fixed types are registered by full name
//! (`namespace.name`).  A later reference to the same name resolves to the
//! same id.  Recursive records are built with [`SchemaBuilder::declare_record`]
//! (reserves the id) followed by [`SchemaBuilder::define_record`].
//!
//! # Validation
//! [`SchemaBuilder::build`] checks every structural invariant once; a built
//! [`Schema`] is never mutated afterwards.

pub mod json;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{invalid_schema, Result};
use crate::value::Value;

// ── Identity ─────────────────────────────────────────────────────────────────

/// Index of a node inside its [`Schema`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize { self.0 }
}

/// A possibly namespaced type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub name:      String,
    pub namespace: Option<String>,
}

impl Name {
    /// Parse `"a.b.Rec"` into namespace `a.b` and name `Rec`.
    pub fn new(fullname: &str) -> Self {
        match fullname.rsplit_once('.') {
            Some((ns, name)) => Self {
                name:      name.to_owned(),
                namespace: (!ns.is_empty()).then(|| ns.to_owned()),
            },
            None => Self { name: fullname.to_owned(), namespace: None },
        }
    }

    /// A dotted `name` carries its own namespace; otherwise `enclosing` applies.
    pub fn with_enclosing(name: &str, enclosing: Option<&str>) -> Self {
        if name.contains('.') {
            return Self::new(name);
        }
        Self {
            name:      name.to_owned(),
            namespace: enclosing.filter(|ns| !ns.is_empty()).map(str::to_owned),
        }
    }

    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None     => self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

// ── Nodes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name:    String,
    pub schema:  NodeId,
    pub default: Option<Value>,
    pub aliases: Vec<String>,
    pub doc:     Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: NodeId) -> Self {
        Self { name: name.into(), schema, default: None, aliases: Vec::new(), doc: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// True if `name` is this field's name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Fixed {
        name:    Name,
        aliases: Vec<Name>,
        size:    usize,
    },
    Enum {
        name:    Name,
        aliases: Vec<Name>,
        doc:     Option<String>,
        symbols: Vec<String>,
        default: Option<String>,
    },
    Array(NodeId),
    Map(NodeId),
    Union(Vec<NodeId>),
    Record {
        name:    Name,
        aliases: Vec<Name>,
        doc:     Option<String>,
        fields:  Vec<Field>,
    },
}

impl SchemaNode {
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaNode::Null        => "null",
            SchemaNode::Boolean     => "boolean",
            SchemaNode::Int         => "int",
            SchemaNode::Long        => "long",
            SchemaNode::Float       => "float",
            SchemaNode::Double      => "double",
            SchemaNode::Bytes       => "bytes",
            SchemaNode::String      => "string",
            SchemaNode::Fixed { .. }  => "fixed",
            SchemaNode::Enum { .. }   => "enum",
            SchemaNode::Array(_)    => "array",
            SchemaNode::Map(_)      => "map",
            SchemaNode::Union(_)    => "union",
            SchemaNode::Record { .. } => "record",
        }
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            SchemaNode::Fixed { name, .. }
            | SchemaNode::Enum { name, .. }
            | SchemaNode::Record { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn aliases(&self) -> &[Name] {
        match self {
            SchemaNode::Fixed { aliases, .. }
            | SchemaNode::Enum { aliases, .. }
            | SchemaNode::Record { aliases, .. } => aliases,
            _ => &[],
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            SchemaNode::Null
                | SchemaNode::Boolean
                | SchemaNode::Int
                | SchemaNode::Long
                | SchemaNode::Float
                | SchemaNode::Double
                | SchemaNode::Bytes
                | SchemaNode::String
        )
    }

    /// Key used to reject ambiguous unions: named members by full name,
    /// everything else by kind.
    fn union_key(&self) -> String {
        match self.name() {
            Some(name) => name.fullname(),
            None       => self.kind().to_owned(),
        }
    }
}

// ── Schema ───────────────────────────────────────────────────────────────────

/// A validated, immutable schema tree with a distinguished root.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    names: HashMap<String, NodeId>,
    root:  NodeId,
}

impl Schema {
    /// Single-node schema for a primitive type.
    pub fn primitive(node: SchemaNode) -> Result<Self> {
        if !node.is_primitive() {
            return Err(invalid_schema(format!("{} is not a primitive type", node.kind())));
        }
        let mut b = SchemaBuilder::new();
        let root = b.add(node)?;
        b.build(root)
    }

    #[inline]
    pub fn root(&self) -> NodeId { self.root }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SchemaNode { &self.nodes[id.0] }

    pub fn root_node(&self) -> &SchemaNode { self.node(self.root) }

    pub fn lookup(&self, fullname: &str) -> Option<NodeId> {
        self.names.get(fullname).copied()
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Names that `id` answers to: its full name, its short name and aliases.
    pub(crate) fn name_matches(&self, id: NodeId, other: &Name) -> bool {
        let node = self.node(id);
        match node.name() {
            Some(name) => {
                name.name == other.name
                    || node.aliases().iter().any(|a| a.name == other.name || *a == *other)
            }
            None => false,
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Incrementally assembles a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes:   Vec<SchemaNode>,
    names:   HashMap<String, NodeId>,
    pending: HashSet<NodeId>,
}

impl SchemaBuilder {
    pub fn new() -> Self { Self::default() }

    /// Add a node.  Named nodes are registered under their full name.
    pub fn add(&mut self, node: SchemaNode) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        if let Some(name) = node.name() {
            self.register(name, id)?;
        }
        self.nodes.push(node);
        Ok(id)
    }

    /// Reserve a record slot so its fields can refer back to it.
    pub fn declare_record(&mut self, name: Name) -> Result<NodeId> {
        let id = self.add(SchemaNode::Record {
            name,
            aliases: Vec::new(),
            doc:     None,
            fields:  Vec::new(),
        })?;
        self.pending.insert(id);
        Ok(id)
    }

    pub fn define_record(&mut self, id: NodeId, fields: Vec<Field>) -> Result<()> {
        self.define_record_with(id, fields, Vec::new(), None)
    }

    pub fn define_record_with(
        &mut self,
        id:          NodeId,
        new_fields:  Vec<Field>,
        new_aliases: Vec<Name>,
        new_doc:     Option<String>,
    ) -> Result<()> {
        if !self.pending.remove(&id) {
            return Err(invalid_schema(format!("node {} is not a declared record", id.0)));
        }
        match &mut self.nodes[id.0] {
            SchemaNode::Record { fields, aliases, doc, .. } => {
                *fields = new_fields;
                *aliases = new_aliases;
                *doc = new_doc;
                Ok(())
            }
            other => Err(invalid_schema(format!("node {} is a {}", id.0, other.kind()))),
        }
    }

    pub fn lookup(&self, fullname: &str) -> Option<NodeId> {
        self.names.get(fullname).copied()
    }

    /// Validate every node and freeze the arena.
    pub fn build(self, root: NodeId) -> Result<Schema> {
        if root.0 >= self.nodes.len() {
            return Err(invalid_schema(format!("root node {} does not exist", root.0)));
        }
        if let Some(id) = self.pending.iter().next() {
            let name = self.nodes[id.0].name().map(Name::fullname).unwrap_or_default();
            return Err(invalid_schema(format!("record '{name}' declared but never defined")));
        }
        let schema = Schema { nodes: self.nodes, names: self.names, root };
        for (i, node) in schema.nodes.iter().enumerate() {
            validate_node(&schema, node).map_err(|e| match e {
                crate::error::Error::InvalidSchema(msg) => {
                    invalid_schema(format!("node {i} ({}): {msg}", node.kind()))
                }
                other => other,
            })?;
        }
        Ok(schema)
    }

    fn register(&mut self, name: &Name, id: NodeId) -> Result<()> {
        validate_name(&name.name)?;
        let full = name.fullname();
        if self.names.insert(full.clone(), id).is_some() {
            return Err(invalid_schema(format!("type '{full}' defined twice")));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if ok { Ok(()) } else { Err(invalid_schema(format!("invalid name '{name}'"))) }
}

fn check_id(schema: &Schema, id: NodeId) -> Result<()> {
    if id.0 < schema.nodes.len() {
        Ok(())
    } else {
        Err(invalid_schema(format!("dangling node reference {}", id.0)))
    }
}

fn validate_node(schema: &Schema, node: &SchemaNode) -> Result<()> {
    match node {
        SchemaNode::Fixed { size, .. } => {
            if *size == 0 {
                return Err(invalid_schema("fixed size must be positive"));
            }
        }
        SchemaNode::Enum { symbols, default, .. } => {
            let mut seen = HashSet::new();
            for s in symbols {
                validate_name(s)?;
                if !seen.insert(s) {
                    return Err(invalid_schema(format!("duplicate enum symbol '{s}'")));
                }
            }
            if let Some(d) = default {
                if !symbols.contains(d) {
                    return Err(invalid_schema(format!("enum default '{d}' is not a symbol")));
                }
            }
        }
        SchemaNode::Array(items) => check_id(schema, *items)?,
        SchemaNode::Map(values) => check_id(schema, *values)?,
        SchemaNode::Union(members) => {
            let mut seen = HashSet::new();
            for m in members {
                check_id(schema, *m)?;
                let member = schema.node(*m);
                if matches!(member, SchemaNode::Union(_)) {
                    return Err(invalid_schema("union may not directly contain a union"));
                }
                if !seen.insert(member.union_key()) {
                    return Err(invalid_schema(format!(
                        "union contains more than one '{}'",
                        member.union_key()
                    )));
                }
            }
        }
        SchemaNode::Record { fields, .. } => {
            let mut seen = HashSet::new();
            for f in fields {
                validate_name(&f.name)?;
                check_id(schema, f.schema)?;
                if !seen.insert(f.name.as_str()) {
                    return Err(invalid_schema(format!("duplicate field '{}'", f.name)));
                }
                if let Some(d) = &f.default {
                    if !d.conforms(schema, f.schema) {
                        return Err(invalid_schema(format!(
                            "default for field '{}' does not match its {} schema",
                            f.name,
                            schema.node(f.schema).kind()
                        )));
                    }
                    if let (SchemaNode::Union(_), Value::Union(i, _)) = (schema.node(f.schema), d) {
                        if *i != 0 {
                            return Err(invalid_schema(format!(
                                "default for union field '{}' must use the first member",
                                f.name
                            )));
                        }
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}
