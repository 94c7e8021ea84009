//! Expression IR for pipeline conditionals
//!
//! Nodes live in an [`ExprArena`] and refer to their children by [`ExprId`].
//! Source metadata is kept in a side table indexed by the same id, so the
//! node table holds only what compilation needs. Children must exist before
//! their parent is added, which keeps every tree acyclic and finite.

pub mod frame;
pub mod operators;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use recursion::CollapsibleExt;

use crate::error::MalformedExpressionError;
use crate::source::SourceWithMetadata;
use crate::value::{FieldPath, Value};

pub use frame::{ExprFrame, Layer, NodeRef};
pub use operators::{BinaryOp, UnaryOp};

static NEXT_ARENA_TAG: AtomicU32 = AtomicU32::new(0);

/// Handle to a node, valid only for the arena that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId {
    arena: u32,
    index: u32,
}

impl ExprId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// constant string, number, boolean, or array of those
    Literal(Value),
    /// regex pattern source, compiled by the compiler
    Regex(String),
    Field(FieldPath),
    Unary(UnaryOp, ExprId),
    Binary(BinaryOp, ExprId, ExprId),
}

impl Node {
    pub fn children(&self) -> impl Iterator<Item = ExprId> {
        let (a, b) = match self {
            Node::Unary(_, x) => (Some(*x), None),
            Node::Binary(_, l, r) => (Some(*l), Some(*r)),
            Node::Literal(_) | Node::Regex(_) | Node::Field(_) => (None, None),
        };
        a.into_iter().chain(b)
    }

    fn name(&self) -> &'static str {
        match self {
            Node::Literal(_) => "literal",
            Node::Regex(_) => "regex",
            Node::Field(_) => "field reference",
            Node::Unary(UnaryOp::Not, _) => "!",
            Node::Unary(UnaryOp::Truthy, _) => "truthy",
            Node::Binary(op, _, _) => op.symbol(),
        }
    }
}

#[derive(Debug)]
pub struct ExprArena {
    tag: u32,
    nodes: Vec<Node>,
    sources: Vec<SourceWithMetadata>,
}

impl Default for ExprArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprArena {
    pub fn new() -> Self {
        Self {
            tag: NEXT_ARENA_TAG.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: ExprId) -> bool {
        id.arena == self.tag && id.index() < self.nodes.len()
    }

    /// Every id issued by this arena, children before parents
    pub fn ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        (0..self.nodes.len()).map(|index| ExprId {
            arena: self.tag,
            index: index as u32,
        })
    }

    pub fn get(&self, id: ExprId) -> Option<NodeRef<'_>> {
        self.contains(id).then_some(NodeRef { arena: self, id })
    }

    pub fn node(&self, id: ExprId) -> Option<&Node> {
        self.get(id).map(|n| n.node())
    }

    pub fn source(&self, id: ExprId) -> Option<&SourceWithMetadata> {
        self.get(id).map(|n| n.source())
    }

    fn push(&mut self, source: SourceWithMetadata, node: Node) -> ExprId {
        let id = ExprId {
            arena: self.tag,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(node);
        self.sources.push(source);
        id
    }

    fn require(
        &self,
        id: ExprId,
        parent: &'static str,
        role: &'static str,
        source: &SourceWithMetadata,
    ) -> Result<(), MalformedExpressionError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(MalformedExpressionError::unknown_node(parent, role, source.clone()))
        }
    }

    // ========================================================================
    // Constructors, one per grammar production
    // ========================================================================

    pub fn literal(
        &mut self,
        source: SourceWithMetadata,
        value: impl Into<Value>,
    ) -> Result<ExprId, MalformedExpressionError> {
        let value = value.into();
        if let Err(kind) = check_literal(&value) {
            return Err(MalformedExpressionError::unsupported_literal(kind, source));
        }
        Ok(self.push(source, Node::Literal(value)))
    }

    /// Pattern syntax is not checked here; the compiler rejects bad patterns.
    pub fn regex(&mut self, source: SourceWithMetadata, pattern: impl Into<String>) -> ExprId {
        self.push(source, Node::Regex(pattern.into()))
    }

    pub fn field(
        &mut self,
        source: SourceWithMetadata,
        path: &str,
    ) -> Result<ExprId, MalformedExpressionError> {
        match FieldPath::parse(path) {
            Ok(path) => Ok(self.field_path(source, path)),
            Err(reason) => Err(MalformedExpressionError::invalid_field_path(path, reason, source)),
        }
    }

    pub fn field_path(&mut self, source: SourceWithMetadata, path: FieldPath) -> ExprId {
        self.push(source, Node::Field(path))
    }

    pub fn unary(
        &mut self,
        source: SourceWithMetadata,
        op: UnaryOp,
        operand: ExprId,
    ) -> Result<ExprId, MalformedExpressionError> {
        let node = Node::Unary(op, operand);
        self.require(operand, node.name(), "operand", &source)?;
        Ok(self.push(source, node))
    }

    pub fn not(
        &mut self,
        source: SourceWithMetadata,
        operand: ExprId,
    ) -> Result<ExprId, MalformedExpressionError> {
        self.unary(source, UnaryOp::Not, operand)
    }

    pub fn truthy(
        &mut self,
        source: SourceWithMetadata,
        operand: ExprId,
    ) -> Result<ExprId, MalformedExpressionError> {
        self.unary(source, UnaryOp::Truthy, operand)
    }

    pub fn binary(
        &mut self,
        source: SourceWithMetadata,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> Result<ExprId, MalformedExpressionError> {
        self.require(left, op.symbol(), "left", &source)?;
        self.require(right, op.symbol(), "right", &source)?;
        Ok(self.push(source, Node::Binary(op, left, right)))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Config-syntax rendering of a subtree. A shared operand is written out
    /// at every use, so the text can be far larger than the arena; keys and
    /// log lines never depend on it.
    pub fn render(&self, id: ExprId) -> Option<String> {
        self.get(id).map(|n| n.to_string())
    }

    /// Compare two subtrees (possibly from different arenas) by shape and
    /// content, ignoring source metadata.
    pub fn same_structure(&self, a: ExprId, other: &ExprArena, b: ExprId) -> bool {
        let (Some(a), Some(b)) = (self.get(a), other.get(b)) else {
            return false;
        };

        let mut seen = HashSet::new();
        let mut work = vec![(a, b)];
        while let Some((x, y)) = work.pop() {
            if !seen.insert((x.id(), y.id())) {
                continue;
            }
            match (x.node(), y.node()) {
                (Node::Literal(l), Node::Literal(r)) if l == r => {}
                (Node::Regex(l), Node::Regex(r)) if l == r => {}
                (Node::Field(l), Node::Field(r)) if l == r => {}
                (Node::Unary(lop, l), Node::Unary(rop, r)) if lop == rop => {
                    work.push((x.child(*l), y.child(*r)));
                }
                (Node::Binary(lop, ll, lr), Node::Binary(rop, rl, rr)) if lop == rop => {
                    work.push((x.child(*ll), y.child(*rl)));
                    work.push((x.child(*lr), y.child(*rr)));
                }
                _ => return false,
            }
        }
        true
    }
}

fn check_literal(value: &Value) -> Result<(), &'static str> {
    match value {
        Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => Ok(()),
        Value::Array(items) => items.iter().try_for_each(check_literal),
        other => Err(other.kind()),
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = (*self).collapse_frames(|frame: ExprFrame<'_, String>| match frame.layer {
            Layer::Literal(v) => v.to_string(),
            Layer::Regex(p) => format!("/{}/", p.replace('/', "\\/")),
            Layer::Field(path) => path.to_string(),
            Layer::Unary(UnaryOp::Not, x) => format!("!{}", x),
            Layer::Unary(UnaryOp::Truthy, x) => x,
            Layer::Binary(op, a, b) => format!("({} {} {})", a, op, b),
        });
        f.write_str(&rendered)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?}: {})", self.id, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedExpressionError;

    fn src(text: &str) -> SourceWithMetadata {
        SourceWithMetadata::new("test.conf", 1, 1, text)
    }

    fn status_and_type(arena: &mut ExprArena) -> ExprId {
        let status = arena.field(src("[status]"), "[status]").unwrap();
        let code = arena.literal(src("200"), 200i64).unwrap();
        let lhs = arena.binary(src("[status] == 200"), BinaryOp::Eq, status, code).unwrap();
        let ty = arena.field(src("[type]"), "type").unwrap();
        let debug = arena.literal(src("\"debug\""), "debug").unwrap();
        let rhs = arena.binary(src("[type] != \"debug\""), BinaryOp::Neq, ty, debug).unwrap();
        arena.binary(src("all"), BinaryOp::And, lhs, rhs).unwrap()
    }

    #[test]
    fn render_uses_operator_symbols() {
        let mut arena = ExprArena::new();
        let root = status_and_type(&mut arena);
        assert_eq!(
            arena.render(root).unwrap(),
            "(([status] == 200) and ([type] != \"debug\"))"
        );
    }

    #[test]
    fn render_not_and_regex() {
        let mut arena = ExprArena::new();
        let msg = arena.field(src("[msg]"), "msg").unwrap();
        let re = arena.regex(src("/a\\/b/"), "a/b");
        let m = arena.binary(src("m"), BinaryOp::RegexEq, msg, re).unwrap();
        let n = arena.not(src("n"), m).unwrap();
        assert_eq!(arena.render(n).unwrap(), "!([msg] =~ /a\\/b/)");
    }

    #[test]
    fn source_side_table_is_indexed_by_id() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let one = arena.literal(src("1"), 1i64).unwrap();
        assert_eq!(arena.source(a).unwrap().text, "[a]");
        assert_eq!(arena.source(one).unwrap().text, "1");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn foreign_child_is_rejected() {
        let mut other = ExprArena::new();
        let foreign = other.literal(src("1"), 1i64).unwrap();

        let mut arena = ExprArena::new();
        let local = arena.literal(src("1"), 1i64).unwrap();
        let err = arena
            .binary(src("1 == ?"), BinaryOp::Eq, local, foreign)
            .unwrap_err();
        assert!(matches!(
            err,
            MalformedExpressionError::UnknownNode { role: "right", parent: "==", .. }
        ));
        assert!(!arena.contains(foreign));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn unsupported_literals_are_rejected() {
        let mut arena = ExprArena::new();
        for value in [
            Value::Absent,
            Value::Null,
            Value::Map(Default::default()),
            Value::Array(vec![Value::Integer(1), Value::Null]),
        ] {
            let err = arena.literal(src("x"), value).unwrap_err();
            assert!(matches!(err, MalformedExpressionError::UnsupportedLiteral { .. }));
        }
        assert!(arena.is_empty());

        let nested = Value::from(vec![Value::from(vec![1i64, 2]), Value::from("x")]);
        assert!(arena.literal(src("[[1, 2], \"x\"]"), nested).is_ok());
    }

    #[test]
    fn bad_field_path_is_rejected() {
        let mut arena = ExprArena::new();
        let err = arena.field(src("[a"), "[a").unwrap_err();
        assert!(matches!(err, MalformedExpressionError::InvalidFieldPath { .. }));
    }

    #[test]
    fn same_structure_ignores_source() {
        let mut a = ExprArena::new();
        let ra = status_and_type(&mut a);

        let mut b = ExprArena::new();
        let status = b.field(SourceWithMetadata::synthetic("s"), "status").unwrap();
        let code = b.literal(SourceWithMetadata::synthetic("c"), 200i64).unwrap();
        let lhs = b
            .binary(SourceWithMetadata::synthetic("l"), BinaryOp::Eq, status, code)
            .unwrap();
        let ty = b.field(SourceWithMetadata::synthetic("t"), "[type]").unwrap();
        let debug = b.literal(SourceWithMetadata::synthetic("d"), "debug").unwrap();
        let rhs = b
            .binary(SourceWithMetadata::synthetic("r"), BinaryOp::Neq, ty, debug)
            .unwrap();
        let rb = b
            .binary(SourceWithMetadata::synthetic("root"), BinaryOp::And, lhs, rhs)
            .unwrap();

        assert!(a.same_structure(ra, &b, rb));
        assert!(!a.same_structure(ra, &b, lhs));
        // integer and float literals are different nodes even if numerically equal
        let f = b.literal(SourceWithMetadata::synthetic("200.0"), 200.0).unwrap();
        assert!(!b.same_structure(code, &b, f));
    }

    #[test]
    fn same_structure_visits_shared_pairs_once() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let mut x = arena.truthy(src("[a]"), a).unwrap();
        let mut y = arena.truthy(src("[a]"), a).unwrap();
        for _ in 0..64 {
            x = arena.binary(src("x and x"), BinaryOp::And, x, x).unwrap();
            y = arena.binary(src("y and y"), BinaryOp::And, y, y).unwrap();
        }
        assert!(arena.same_structure(x, &arena, y));

        let z = arena.not(src("!y"), y).unwrap();
        let w = arena.binary(src("x and !y"), BinaryOp::And, x, z).unwrap();
        assert!(!arena.same_structure(w, &arena, x));
        assert_eq!(arena.ids().count(), arena.len());
    }
}
