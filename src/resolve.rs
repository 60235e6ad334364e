//! Schema resolution: reading data written with one schema as another.
//!
//! [`ResolvedSchema::new`] walks a (writer, reader) pair once and produces a
//! plan: an arena of [`Plan`] nodes the datum decoder follows instead of the
//! raw schemas.  Every incompatibility that can be detected without data is
//! reported here, before the first byte is decoded.
//!
//! # Rules
//! - identical primitives pass through; int→long→float→double and
//!   long→double promote, nothing else converts.
//! - records, enums and fixed types match by unqualified name or reader alias.
//! - record fields match by name or reader-field alias; missing reader fields
//!   take their default; writer-only fields are decoded and dropped.
//! - enum symbols map by name; a writer symbol unknown to the reader becomes
//!   the reader's default symbol, and without one the pair is incompatible.
//! - union branches are chosen by the writer's tag at decode time; a writer
//!   branch the reader cannot accept fails only if it is actually used.
//!
//! Record plans are memoized per (writer node, reader node) so recursive
//! schemas produce a cyclic plan rather than an infinite one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::{incompatible, Error, Result};
use crate::schema::{NodeId, Schema, SchemaNode};
use crate::value::Value;

/// Index of a node inside a [`ResolvedSchema`] plan arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToFloat,
    LongToDouble,
    FloatToDouble,
}

impl Promotion {
    fn between(writer: &SchemaNode, reader: &SchemaNode) -> Option<Self> {
        use SchemaNode::*;
        Some(match (writer, reader) {
            (Int, Long)     => Promotion::IntToLong,
            (Int, Float)    => Promotion::IntToFloat,
            (Int, Double)   => Promotion::IntToDouble,
            (Long, Float)   => Promotion::LongToFloat,
            (Long, Double)  => Promotion::LongToDouble,
            (Float, Double) => Promotion::FloatToDouble,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldStep {
    /// Decode with `plan` into reader field slot `reader_pos`.
    Read { reader_pos: usize, plan: PlanId },
    /// Writer-only field: consume its bytes under the writer schema.
    Skip { name: String, writer: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    /// Decode with `plan`; wrap as reader union member `reader_index` if any.
    To { reader_index: Option<usize>, plan: PlanId },
    /// The reader has no counterpart for this writer member.
    Unmatched { writer_kind: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Promote(Promotion),
    Fixed(usize),
    /// Writer symbol index → reader symbol.
    Enum { symbols: Vec<String> },
    Array(PlanId),
    Map(PlanId),
    Record {
        /// In writer field order.
        steps:    Vec<FieldStep>,
        /// Reader fields absent from the writer: (reader position, default).
        defaults: Vec<(usize, Value)>,
        /// Reader field names in reader order.
        names:    Vec<String>,
    },
    /// Writer is a union; one entry per writer member.
    WriterUnion { branches: Vec<Branch> },
    /// Writer is not a union, the reader is: always member `index`.
    ReaderUnion { index: usize, plan: PlanId },
}

/// The resolution plan for one (writer, reader) schema pair.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    writer: Arc<Schema>,
    reader: Arc<Schema>,
    plans:  Vec<Plan>,
    root:   PlanId,
}

impl ResolvedSchema {
    pub fn new(writer: Arc<Schema>, reader: Arc<Schema>) -> Result<Self> {
        let mut builder = PlanBuilder {
            writer: &writer,
            reader: &reader,
            plans:  Vec::new(),
            memo:   HashMap::new(),
        };
        let root = builder.resolve(writer.root(), reader.root())?;
        let plans = builder.plans;
        trace!(plans = plans.len(), "resolved writer/reader schema pair");
        Ok(Self { writer, reader, plans, root })
    }

    /// Plan for reading data with the schema it was written with.
    pub fn identity(schema: Arc<Schema>) -> Result<Self> {
        Self::new(Arc::clone(&schema), schema)
    }

    pub fn writer(&self) -> &Arc<Schema> { &self.writer }

    pub fn reader(&self) -> &Arc<Schema> { &self.reader }

    #[inline]
    pub fn root(&self) -> PlanId { self.root }

    #[inline]
    pub fn plan(&self, id: PlanId) -> &Plan { &self.plans[id.0] }

    pub(crate) fn plans(&self) -> &[Plan] { &self.plans }
}

// ── Plan construction ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Match {
    Exact,
    Promotable,
    No,
}

struct PlanBuilder<'a> {
    writer: &'a Schema,
    reader: &'a Schema,
    plans:  Vec<Plan>,
    memo:   HashMap<(NodeId, NodeId), PlanId>,
}

fn within(context: impl std::fmt::Display) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::IncompatibleSchema(msg) => incompatible(format!("{context}: {msg}")),
        other => other,
    }
}

impl<'a> PlanBuilder<'a> {
    fn push(&mut self, plan: Plan) -> PlanId {
        self.plans.push(plan);
        PlanId(self.plans.len() - 1)
    }

    fn named_match(&self, w: NodeId, r: NodeId) -> bool {
        match self.writer.node(w).name() {
            Some(wname) => self.reader.name_matches(r, wname),
            None => false,
        }
    }

    /// Shallow test used to pick union branches.
    fn matches(&self, w: NodeId, r: NodeId) -> Match {
        let (wn, rn) = (self.writer.node(w), self.reader.node(r));
        if wn.is_primitive() && wn == rn {
            return Match::Exact;
        }
        if Promotion::between(wn, rn).is_some() {
            return Match::Promotable;
        }
        match (wn, rn) {
            (SchemaNode::Array(_), SchemaNode::Array(_))
            | (SchemaNode::Map(_), SchemaNode::Map(_)) => Match::Exact,
            (SchemaNode::Fixed { size: ws, .. }, SchemaNode::Fixed { size: rs, .. }) => {
                if ws == rs && self.named_match(w, r) { Match::Exact } else { Match::No }
            }
            (SchemaNode::Enum { .. }, SchemaNode::Enum { .. })
            | (SchemaNode::Record { .. }, SchemaNode::Record { .. }) => {
                if self.named_match(w, r) { Match::Exact } else { Match::No }
            }
            _ => Match::No,
        }
    }

    /// First exact reader member, else first promotable one.
    fn best_member(&self, w: NodeId, members: &[NodeId]) -> Option<usize> {
        let ranked = |want: Match| members.iter().position(|m| self.matches(w, *m) == want);
        ranked(Match::Exact).or_else(|| ranked(Match::Promotable))
    }

    fn resolve(&mut self, w: NodeId, r: NodeId) -> Result<PlanId> {
        let (writer, reader) = (self.writer, self.reader);
        let (wn, rn) = (writer.node(w), reader.node(r));

        // Writer unions first: the tag picks the branch at decode time.
        if let SchemaNode::Union(wmembers) = wn {
            let mut branches = Vec::with_capacity(wmembers.len());
            for &wm in wmembers {
                let branch = match rn {
                    SchemaNode::Union(rmembers) => match self.best_member(wm, rmembers) {
                        Some(i) => Branch::To {
                            reader_index: Some(i),
                            plan:         self.resolve(wm, rmembers[i])?,
                        },
                        None => Branch::Unmatched { writer_kind: writer.node(wm).kind() },
                    },
                    _ if self.matches(wm, r) != Match::No => Branch::To {
                        reader_index: None,
                        plan:         self.resolve(wm, r)?,
                    },
                    _ => Branch::Unmatched { writer_kind: writer.node(wm).kind() },
                };
                branches.push(branch);
            }
            if !branches.is_empty() && branches.iter().all(|b| matches!(b, Branch::Unmatched { .. })) {
                return Err(incompatible(format!(
                    "no member of the writer union can be read as {}",
                    rn.kind()
                )));
            }
            return Ok(self.push(Plan::WriterUnion { branches }));
        }

        if let SchemaNode::Union(rmembers) = rn {
            let index = self.best_member(w, rmembers).ok_or_else(|| {
                incompatible(format!("reader union has no member matching writer {}", wn.kind()))
            })?;
            let plan = self.resolve(w, rmembers[index])?;
            return Ok(self.push(Plan::ReaderUnion { index, plan }));
        }

        let plan = match (wn, rn) {
            (SchemaNode::Null, SchemaNode::Null)       => Plan::Null,
            (SchemaNode::Boolean, SchemaNode::Boolean) => Plan::Boolean,
            (SchemaNode::Int, SchemaNode::Int)         => Plan::Int,
            (SchemaNode::Long, SchemaNode::Long)       => Plan::Long,
            (SchemaNode::Float, SchemaNode::Float)     => Plan::Float,
            (SchemaNode::Double, SchemaNode::Double)   => Plan::Double,
            (SchemaNode::Bytes, SchemaNode::Bytes)     => Plan::Bytes,
            (SchemaNode::String, SchemaNode::String)   => Plan::String,
            (SchemaNode::Fixed { name, size: ws, .. }, SchemaNode::Fixed { size: rs, .. }) => {
                if !self.named_match(w, r) {
                    return Err(incompatible(format!("fixed '{name}' does not match reader name")));
                }
                if ws != rs {
                    return Err(incompatible(format!(
                        "fixed '{name}' has size {ws} in writer, {rs} in reader"
                    )));
                }
                Plan::Fixed(*ws)
            }
            (
                SchemaNode::Enum { name, symbols: wsyms, .. },
                SchemaNode::Enum { symbols: rsyms, default, .. },
            ) => {
                if !self.named_match(w, r) {
                    return Err(incompatible(format!("enum '{name}' does not match reader name")));
                }
                let symbols = wsyms
                    .iter()
                    .map(|s| {
                        if rsyms.contains(s) {
                            Ok(s.clone())
                        } else {
                            default.clone().ok_or_else(|| {
                                incompatible(format!(
                                    "enum '{name}': symbol '{s}' unknown to reader, no default"
                                ))
                            })
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Plan::Enum { symbols }
            }
            (SchemaNode::Array(wi), SchemaNode::Array(ri)) => {
                Plan::Array(self.resolve(*wi, *ri).map_err(within("array items"))?)
            }
            (SchemaNode::Map(wv), SchemaNode::Map(rv)) => {
                Plan::Map(self.resolve(*wv, *rv).map_err(within("map values"))?)
            }
            (SchemaNode::Record { .. }, SchemaNode::Record { .. }) => return self.record(w, r),
            _ => match Promotion::between(wn, rn) {
                Some(p) => Plan::Promote(p),
                None => {
                    return Err(incompatible(format!(
                        "writer {} cannot be read as {}",
                        wn.kind(),
                        rn.kind()
                    )))
                }
            },
        };
        Ok(self.push(plan))
    }

    fn record(&mut self, w: NodeId, r: NodeId) -> Result<PlanId> {
        if let Some(&id) = self.memo.get(&(w, r)) {
            return Ok(id);
        }
        let (writer, reader) = (self.writer, self.reader);
        let (
            SchemaNode::Record { name: wname, fields: wfields, .. },
            SchemaNode::Record { name: rname, fields: rfields, .. },
        ) = (writer.node(w), reader.node(r))
        else {
            return Err(incompatible("record plan requested for non-record nodes"));
        };
        if !self.named_match(w, r) {
            return Err(incompatible(format!(
                "writer record '{wname}' does not match reader record '{rname}'"
            )));
        }

        // Reserve the slot so recursive references resolve to it.
        let id = self.push(Plan::Null);
        self.memo.insert((w, r), id);

        let mut matched = vec![false; rfields.len()];
        let mut steps = Vec::with_capacity(wfields.len());
        for wf in wfields {
            let pos = rfields
                .iter()
                .position(|rf| rf.name == wf.name)
                .or_else(|| rfields.iter().position(|rf| rf.answers_to(&wf.name)));
            match pos {
                Some(pos) if !matched[pos] => {
                    matched[pos] = true;
                    let plan = self
                        .resolve(wf.schema, rfields[pos].schema)
                        .map_err(within(format!("{rname}.{}", rfields[pos].name)))?;
                    steps.push(FieldStep::Read { reader_pos: pos, plan });
                }
                _ => steps.push(FieldStep::Skip { name: wf.name.clone(), writer: wf.schema }),
            }
        }

        let mut defaults = Vec::new();
        for (pos, rf) in rfields.iter().enumerate().filter(|(pos, _)| !matched[*pos]) {
            match &rf.default {
                Some(d) => defaults.push((pos, d.clone())),
                None => {
                    return Err(incompatible(format!(
                        "reader field '{rname}.{}' is missing from the writer and has no default",
                        rf.name
                    )))
                }
            }
        }

        self.plans[id.0] = Plan::Record {
            steps,
            defaults,
            names: rfields.iter().map(|f| f.name.clone()).collect(),
        };
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(text: &str) -> Arc<Schema> {
        Arc::new(Schema::parse_str(text).unwrap())
    }

    fn resolve(w: &str, r: &str) -> Result<ResolvedSchema> {
        ResolvedSchema::new(schema(w), schema(r))
    }

    #[test]
    fn identical_primitives_pass_through() {
        let p = resolve(r#""string""#, r#""string""#).unwrap();
        assert_eq!(p.plan(p.root()), &Plan::String);
    }

    #[test]
    fn numeric_promotions() {
        for (w, r, want) in [
            ("int", "long", Promotion::IntToLong),
            ("int", "float", Promotion::IntToFloat),
            ("int", "double", Promotion::IntToDouble),
            ("long", "float", Promotion::LongToFloat),
            ("long", "double", Promotion::LongToDouble),
            ("float", "double", Promotion::FloatToDouble),
        ] {
            let p = resolve(&format!("\"{w}\""), &format!("\"{r}\"")).unwrap();
            assert_eq!(p.plan(p.root()), &Plan::Promote(want), "{w} -> {r}");
        }
        for (w, r) in [("long", "int"), ("double", "float"), ("string", "bytes"), ("int", "string")] {
            let err = resolve(&format!("\"{w}\""), &format!("\"{r}\"")).unwrap_err();
            assert!(err.is_incompatible(), "{w} -> {r}");
        }
    }

    #[test]
    fn record_fields_by_name_alias_and_default() {
        let w = r#"{"type":"record","name":"R","fields":[
            {"name":"a","type":"int"},
            {"name":"old","type":"string"}
        ]}"#;
        let r = r#"{"type":"record","name":"R","fields":[
            {"name":"new","type":"string","aliases":["old"]},
            {"name":"c","type":"int","default":7}
        ]}"#;
        let p = resolve(w, r).unwrap();
        let Plan::Record { steps, defaults, names } = p.plan(p.root()) else {
            panic!("expected record plan");
        };
        assert!(matches!(&steps[0], FieldStep::Skip { name, .. } if name == "a"));
        assert!(matches!(&steps[1], FieldStep::Read { reader_pos: 0, .. }));
        assert_eq!(defaults, &vec![(1, Value::Int(7))]);
        assert_eq!(names, &vec!["new".to_string(), "c".to_string()]);
    }

    #[test]
    fn record_missing_field_without_default_fails() {
        let w = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        let r = r#"{"type":"record","name":"R","fields":[{"name":"b","type":"int"}]}"#;
        let err = resolve(w, r).unwrap_err();
        assert!(err.is_incompatible());
        assert!(err.to_string().contains("R.b"));
    }

    #[test]
    fn record_names_must_match() {
        let w = r#"{"type":"record","name":"A","fields":[]}"#;
        let r = r#"{"type":"record","name":"B","fields":[]}"#;
        assert!(resolve(w, r).is_err());
        let r = r#"{"type":"record","name":"B","aliases":["A"],"fields":[]}"#;
        assert!(resolve(w, r).is_ok());
    }

    #[test]
    fn enum_symbols_and_default() {
        let w = r#"{"type":"enum","name":"E","symbols":["A","B","C"]}"#;
        let r = r#"{"type":"enum","name":"E","symbols":["C","A"],"default":"A"}"#;
        let p = resolve(w, r).unwrap();
        assert_eq!(
            p.plan(p.root()),
            &Plan::Enum { symbols: vec!["A".into(), "A".into(), "C".into()] }
        );
        let r = r#"{"type":"enum","name":"E","symbols":["C","A"]}"#;
        assert!(resolve(w, r).unwrap_err().is_incompatible());
    }

    #[test]
    fn fixed_sizes_must_agree() {
        let w = r#"{"type":"fixed","name":"F","size":4}"#;
        assert!(resolve(w, w).is_ok());
        let r = r#"{"type":"fixed","name":"F","size":8}"#;
        assert!(resolve(w, r).unwrap_err().is_incompatible());
    }

    #[test]
    fn union_branches() {
        let p = resolve(r#"["null","int","string"]"#, r#"["string","null","long"]"#).unwrap();
        let Plan::WriterUnion { branches } = p.plan(p.root()) else {
            panic!("expected writer union plan");
        };
        assert!(matches!(branches[0], Branch::To { reader_index: Some(1), .. }));
        assert!(matches!(branches[1], Branch::To { reader_index: Some(2), .. }));
        assert!(matches!(branches[2], Branch::To { reader_index: Some(0), .. }));

        // Non-union reader: only the int branch is usable.
        let p = resolve(r#"["null","int"]"#, r#""long""#).unwrap();
        let Plan::WriterUnion { branches } = p.plan(p.root()) else {
            panic!("expected writer union plan");
        };
        assert!(matches!(branches[0], Branch::Unmatched { writer_kind: "null" }));
        assert!(matches!(branches[1], Branch::To { reader_index: None, .. }));

        assert!(resolve(r#"["null","int"]"#, r#""string""#).unwrap_err().is_incompatible());
    }

    #[test]
    fn reader_union_prefers_exact_members() {
        let p = resolve(r#""int""#, r#"["null","double","int"]"#).unwrap();
        assert!(matches!(p.plan(p.root()), Plan::ReaderUnion { index: 2, .. }));
        let p = resolve(r#""int""#, r#"["null","double"]"#).unwrap();
        assert!(matches!(p.plan(p.root()), Plan::ReaderUnion { index: 1, .. }));
    }

    #[test]
    fn recursive_schemas_terminate() {
        let list = r#"{"type":"record","name":"List","fields":[
            {"name":"value","type":"long"},
            {"name":"next","type":["null","List"]}
        ]}"#;
        let p = resolve(list, list).unwrap();
        let Plan::Record { steps, .. } = p.plan(p.root()) else {
            panic!("expected record plan");
        };
        let FieldStep::Read { plan: next, .. } = steps[1] else {
            panic!("expected read step");
        };
        let Plan::WriterUnion { branches } = p.plan(next) else {
            panic!("expected writer union plan");
        };
        assert_eq!(branches[1], Branch::To { reader_index: Some(1), plan: p.root() });
    }
}
