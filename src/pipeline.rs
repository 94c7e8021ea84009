//! Wiring compiled conditions into a pipeline's branch points

use std::collections::HashMap;

use slog::{debug, o, Logger};

use crate::compiler::{Compiler, Reachable};
use crate::error::CompileError;
use crate::eval::Condition;
use crate::expr::{BinaryOp, ExprArena, ExprId, Node, UnaryOp};
use crate::source::SourceWithMetadata;
use crate::value::{Event, FieldPath};

/// Structure of one node, with operands replaced by their interned shape
#[derive(Debug, PartialEq, Eq, Hash)]
enum Shape {
    /// `Debug` form: keeps the kind, so `1` and `1.0` differ
    Literal(String),
    Regex(String),
    Field(FieldPath),
    Unary(UnaryOp, u32),
    Binary(BinaryOp, u32, u32),
}

/// Compiles the conditions of a pipeline's branch points.
///
/// Conditionals with the same structure share one compiled [`Condition`],
/// wherever they sit in the pipeline. The cache lives only as long as this
/// compiler; a reload builds a new one and so a wholly new set of conditions.
pub struct ConditionCompiler {
    compiler: Compiler,
    shapes: HashMap<Shape, u32>,
    cache: HashMap<u32, Condition>,
    logger: Logger,
}

impl ConditionCompiler {
    pub fn new(logger: &Logger) -> Self {
        Self {
            compiler: Compiler::new(logger),
            shapes: HashMap::new(),
            cache: HashMap::new(),
            logger: logger.new(o!("component" => "conditions")),
        }
    }

    /// Compile `root` as a branch condition. The root must be a boolean
    /// node: a bare literal or field reference is rejected, since the
    /// parser marks bare values used as conditions with a truthy node.
    pub fn compile_condition(
        &mut self,
        arena: &ExprArena,
        root: ExprId,
    ) -> Result<Condition, CompileError> {
        let node = arena.get(root).ok_or_else(|| {
            CompileError::malformed_node(
                "root is not part of this arena",
                SourceWithMetadata::synthetic("<unknown node>"),
            )
        })?;

        if !node.is_boolean() {
            return Err(CompileError::non_boolean_condition(
                node.to_string(),
                node.source().clone(),
            ));
        }

        let key = self.shape_of(arena, root)?;
        if let Some(condition) = self.cache.get(&key) {
            debug!(self.logger, "reusing compiled condition";
                "expr" => %node.source().text, "shape" => key, "at" => %node.source());
            return Ok(condition.clone());
        }

        let condition = self
            .compiler
            .compile(arena, root)?
            .into_condition()
            .ok_or_else(|| {
                CompileError::non_boolean_condition(
                    node.source().text.clone(),
                    node.source().clone(),
                )
            })?;

        self.cache.insert(key, condition.clone());
        Ok(condition)
    }

    /// Intern every node reachable from `root`, children first, and return
    /// the root's shape id. Each node is visited once.
    fn shape_of(&mut self, arena: &ExprArena, root: ExprId) -> Result<u32, CompileError> {
        let node = arena.get(root).ok_or_else(|| {
            CompileError::malformed_node(
                "root is not part of this arena",
                SourceWithMetadata::synthetic("<unknown node>"),
            )
        })?;
        let reachable = Reachable::walk(arena, node)?;

        let mut ids = vec![0u32; root.index() + 1];
        for current in reachable.nodes(arena) {
            let shape = match current.node() {
                Node::Literal(v) => Shape::Literal(format!("{v:?}")),
                Node::Regex(p) => Shape::Regex(p.clone()),
                Node::Field(path) => Shape::Field(path.clone()),
                Node::Unary(op, x) => Shape::Unary(*op, ids[x.index()]),
                Node::Binary(op, a, b) => Shape::Binary(*op, ids[a.index()], ids[b.index()]),
            };
            let next = self.shapes.len() as u32;
            ids[current.id().index()] = *self.shapes.entry(shape).or_insert(next);
        }
        Ok(ids[root.index()])
    }

    /// Number of distinct compiled conditions
    pub fn compiled(&self) -> usize {
        self.cache.len()
    }
}

/// A conditional in the pipeline graph: routes each event to one of two
/// successors.
#[derive(Debug, Clone)]
pub struct BranchPoint<T> {
    condition: Condition,
    when_true: T,
    when_false: T,
}

impl<T> BranchPoint<T> {
    pub fn new(condition: Condition, when_true: T, when_false: T) -> Self {
        Self {
            condition,
            when_true,
            when_false,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn route(&self, event: &dyn Event) -> &T {
        if self.condition.evaluate(event) {
            &self.when_true
        } else {
            &self.when_false
        }
    }
}
