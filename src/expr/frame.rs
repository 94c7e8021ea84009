use recursion::{Collapsible, MappableFrame, PartiallyApplied};

use super::operators::{BinaryOp, UnaryOp};
use super::{ExprArena, ExprId, Node};
use crate::source::SourceWithMetadata;
use crate::value::{FieldPath, Value};

/// A single layer of an arena expression, used for expressing recursive
/// algorithms (compilation, rendering, comparison) over borrowed nodes.
pub struct ExprFrame<'a, X> {
    pub source: &'a SourceWithMetadata,
    pub layer: Layer<'a, X>,
}

pub enum Layer<'a, X> {
    Literal(&'a Value),
    Regex(&'a str),
    Field(&'a FieldPath),
    Unary(UnaryOp, X),
    Binary(BinaryOp, X, X),
}

impl<'a, X> ExprFrame<'a, X> {
    /// Replace each child with `f(child)`, left before right, stopping at the
    /// first error.
    pub fn try_map<Y, E>(
        self,
        mut f: impl FnMut(X) -> Result<Y, E>,
    ) -> Result<ExprFrame<'a, Y>, E> {
        use Layer::*;
        let layer = match self.layer {
            Literal(v) => Literal(v),
            Regex(p) => Regex(p),
            Field(path) => Field(path),
            Unary(op, a) => Unary(op, f(a)?),
            Binary(op, a, b) => {
                let a = f(a)?;
                Binary(op, a, f(b)?)
            }
        };
        Ok(ExprFrame {
            source: self.source,
            layer,
        })
    }
}

impl<'a> MappableFrame for ExprFrame<'a, PartiallyApplied> {
    type Frame<X> = ExprFrame<'a, X>;

    fn map_frame<A, B>(input: Self::Frame<A>, mut f: impl FnMut(A) -> B) -> Self::Frame<B> {
        use Layer::*;
        let layer = match input.layer {
            Literal(v) => Literal(v),
            Regex(p) => Regex(p),
            Field(path) => Field(path),
            Unary(op, a) => Unary(op, f(a)),
            Binary(op, a, b) => Binary(op, f(a), f(b)),
        };
        ExprFrame {
            source: input.source,
            layer,
        }
    }
}

/// Borrowed handle to one node of an [`ExprArena`].
///
/// Only handed out for ids that belong to the arena; children of a stored
/// node always precede it, so every reachable child is valid too.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(super) arena: &'a ExprArena,
    pub(super) id: ExprId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn node(&self) -> &'a Node {
        &self.arena.nodes[self.id.index as usize]
    }

    pub fn source(&self) -> &'a SourceWithMetadata {
        &self.arena.sources[self.id.index as usize]
    }

    /// Unary and binary nodes produce booleans; leaves produce values.
    pub fn is_boolean(&self) -> bool {
        matches!(self.node(), Node::Unary(..) | Node::Binary(..))
    }

    pub(super) fn child(&self, id: ExprId) -> NodeRef<'a> {
        NodeRef {
            arena: self.arena,
            id,
        }
    }
}

impl<'a> Collapsible for NodeRef<'a> {
    type FrameToken = ExprFrame<'a, PartiallyApplied>;

    fn into_frame(self) -> ExprFrame<'a, Self> {
        let layer = match self.node() {
            Node::Literal(v) => Layer::Literal(v),
            Node::Regex(p) => Layer::Regex(p),
            Node::Field(path) => Layer::Field(path),
            Node::Unary(op, x) => Layer::Unary(*op, self.child(*x)),
            Node::Binary(op, a, b) => Layer::Binary(*op, self.child(*a), self.child(*b)),
        };
        ExprFrame {
            source: self.source(),
            layer,
        }
    }
}
