//! Compile expression trees into evaluators.
//!
//! One forward pass over the nodes reachable from the root, in arena order:
//! children always precede their parents, so every operand is compiled
//! before the node that uses it, and a node shared by several parents is
//! compiled once. Regex patterns are compiled here, so a bad pattern is
//! reported at load time rather than on the first event.
//!
//! Chains of one connective (`a and b and c ...`) are flattened into a single
//! junction evaluated by iteration, so long chains do not nest closures.

use std::collections::VecDeque;

use recursion::Collapsible;
use slog::{debug, o, Logger};

use crate::error::CompileError;
use crate::eval::{Condition, Evaluator, ValueEvaluator};
use crate::expr::{BinaryOp, ExprArena, ExprFrame, ExprId, Layer, NodeRef, UnaryOp};
use crate::hybrid_regex::HybridRegex;
use crate::semantics;
use crate::source::SourceWithMetadata;
use crate::value::Value;

/// Deepest chain of nested evaluators a compiled expression may contain.
/// Terms of a flattened `and`/`or` chain do not count as nesting.
pub const MAX_NESTING: usize = 512;

/// Partially compiled node, tagged with the node's source for error reporting
#[derive(Clone)]
struct Compiled<'a> {
    source: &'a SourceWithMetadata,
    output: Output,
    /// evaluators nested below and including this one
    depth: usize,
}

#[derive(Clone)]
enum Output {
    /// regex literal, only valid as the right operand of `=~`/`!~`
    Pattern(HybridRegex),
    Evaluator(Evaluator),
    /// terms of an `and`/`or` chain, still open to absorb a parent of the
    /// same connective
    Junction(BinaryOp, VecDeque<Condition>),
}

impl<'a> Compiled<'a> {
    fn evaluator(self) -> Result<Evaluator, CompileError> {
        match self.output {
            Output::Evaluator(e) => Ok(e),
            Output::Junction(op, terms) => Ok(Evaluator::Condition(junction(op, terms))),
            Output::Pattern(re) => Err(CompileError::misplaced_pattern(
                re.as_str(),
                self.source.clone(),
            )),
        }
    }

    fn value(self) -> Result<ValueEvaluator, CompileError> {
        self.evaluator().map(Evaluator::into_value)
    }

    fn condition(self) -> Result<Condition, CompileError> {
        self.evaluator().map(Evaluator::into_truthy_condition)
    }

    /// Close an open junction. Shared nodes are sealed before their parents
    /// see them, so no parent copies another parent's terms.
    fn seal(self) -> Self {
        match self.output {
            Output::Junction(op, terms) => Compiled {
                output: Output::Evaluator(Evaluator::Condition(junction(op, terms))),
                ..self
            },
            _ => self,
        }
    }

    /// Depth this operand adds under a chain of `op`
    fn depth_within(&self, op: BinaryOp) -> usize {
        match &self.output {
            Output::Junction(inner, _) if *inner == op => self.depth,
            _ => self.depth + 1,
        }
    }

    /// Operand of `op` as chain terms, absorbing a same-connective junction
    fn terms(self, op: BinaryOp) -> Result<VecDeque<Condition>, CompileError> {
        match self.output {
            Output::Junction(inner, terms) if inner == op => Ok(terms),
            _ => Ok(VecDeque::from([self.condition()?])),
        }
    }

    /// Right operand of a regex operator: a pattern literal, or a string
    /// literal that is compiled as a pattern.
    fn pattern(self, op: BinaryOp) -> Result<HybridRegex, CompileError> {
        match self.output {
            Output::Pattern(re) => Ok(re),
            Output::Evaluator(Evaluator::Value(ValueEvaluator::Constant(Value::String(p)))) => {
                compile_pattern(&p, self.source)
            }
            Output::Evaluator(e) => Err(CompileError::pattern_required(
                op.symbol(),
                describe(&e),
                self.source.clone(),
            )),
            Output::Junction(..) => Err(CompileError::pattern_required(
                op.symbol(),
                "a boolean expression",
                self.source.clone(),
            )),
        }
    }

    /// Right operand of a membership operator. Literals must be an array or
    /// a string; anything read from the event is checked per event instead.
    fn collection(self, op: BinaryOp) -> Result<ValueEvaluator, CompileError> {
        let source = self.source;
        match self.value()? {
            ValueEvaluator::Constant(v) if !matches!(v, Value::Array(_) | Value::String(_)) => {
                Err(CompileError::incompatible_operand(
                    op.symbol(),
                    v.kind(),
                    source.clone(),
                ))
            }
            v => Ok(v),
        }
    }
}

fn junction(op: BinaryOp, terms: VecDeque<Condition>) -> Condition {
    let terms = Vec::from(terms);
    match op {
        BinaryOp::Or => Condition::any(terms),
        _ => Condition::all(terms),
    }
}

/// Concatenate two chains, moving the shorter one
fn join(mut left: VecDeque<Condition>, mut right: VecDeque<Condition>) -> VecDeque<Condition> {
    if left.len() >= right.len() {
        left.append(&mut right);
        left
    } else {
        for term in left.into_iter().rev() {
            right.push_front(term);
        }
        right
    }
}

fn describe(e: &Evaluator) -> &'static str {
    match e {
        Evaluator::Condition(_) => "a boolean expression",
        Evaluator::Value(ValueEvaluator::Field(_)) => "a field reference",
        Evaluator::Value(ValueEvaluator::Condition(_)) => "a boolean expression",
        Evaluator::Value(ValueEvaluator::Constant(v)) => v.kind(),
    }
}

fn compile_pattern(pattern: &str, source: &SourceWithMetadata) -> Result<HybridRegex, CompileError> {
    HybridRegex::new(pattern)
        .map_err(|details| CompileError::invalid_regex(pattern, details, source.clone()))
}

/// Nodes reachable from one root, each visited once, with the number of
/// parent edges pointing at each of them.
pub(crate) struct Reachable {
    reached: Vec<bool>,
    uses: Vec<u32>,
    count: usize,
}

impl Reachable {
    /// Every reachable child must belong to the arena and precede its parent.
    pub(crate) fn walk(arena: &ExprArena, root: NodeRef<'_>) -> Result<Self, CompileError> {
        let len = root.id().index() + 1;
        let mut reachable = Reachable {
            reached: vec![false; len],
            uses: vec![0; len],
            count: 1,
        };
        reachable.reached[root.id().index()] = true;

        let mut work = vec![root];
        while let Some(parent) = work.pop() {
            for child in parent.node().children() {
                let node = match arena.get(child) {
                    Some(c) if child.index() < parent.id().index() => c,
                    Some(_) => {
                        return Err(CompileError::malformed_node(
                            format!("child {} does not precede its parent", child.index()),
                            parent.source().clone(),
                        ))
                    }
                    None => {
                        return Err(CompileError::malformed_node(
                            "operand missing from arena",
                            parent.source().clone(),
                        ))
                    }
                };
                let i = child.index();
                reachable.uses[i] += 1;
                if !reachable.reached[i] {
                    reachable.reached[i] = true;
                    reachable.count += 1;
                    work.push(node);
                }
            }
        }
        Ok(reachable)
    }

    /// Reachable nodes in arena order, children before parents
    pub(crate) fn nodes<'a>(&'a self, arena: &'a ExprArena) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        arena
            .ids()
            .take(self.reached.len())
            .filter(move |id| self.reached[id.index()])
            .filter_map(move |id| arena.get(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }
}

/// Compiles expression trees; holds nothing but its logger, so one compiler
/// can serve every conditional of a pipeline.
pub struct Compiler {
    logger: Logger,
}

impl Compiler {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.new(o!("component" => "compiler")),
        }
    }

    pub fn compile(&self, arena: &ExprArena, root: ExprId) -> Result<Evaluator, CompileError> {
        let node = arena.get(root).ok_or_else(|| {
            CompileError::malformed_node(
                "root is not part of this arena",
                SourceWithMetadata::synthetic("<unknown node>"),
            )
        })?;
        let reachable = Reachable::walk(arena, node)?;

        let mut uses = reachable.uses.clone();
        let mut memo: Vec<Option<Compiled<'_>>> = vec![None; reachable.reached.len()];
        for current in reachable.nodes(arena) {
            let source = current.source();
            let frame = current
                .into_frame()
                .try_map(|child| take_operand(&mut memo, &mut uses, child.id(), source))?;
            let compiled = compile_frame(frame)?;
            let i = current.id().index();
            memo[i] = Some(if uses[i] > 1 { compiled.seal() } else { compiled });
        }

        let compiled = memo[root.index()]
            .take()
            .ok_or_else(|| CompileError::malformed_node("root was not compiled", node.source().clone()))?;
        let depth = compiled.depth;
        let evaluator = compiled.evaluator()?;

        debug!(self.logger, "compiled expression";
            "expr" => %node.source().text, "nodes" => reachable.len(), "depth" => depth,
            "boolean" => evaluator.is_boolean(), "at" => %node.source());

        Ok(evaluator)
    }
}

/// Hand a compiled operand to one of its parents; the last parent takes it,
/// earlier ones get a copy.
fn take_operand<'a>(
    memo: &mut [Option<Compiled<'a>>],
    uses: &mut [u32],
    child: ExprId,
    parent: &SourceWithMetadata,
) -> Result<Compiled<'a>, CompileError> {
    let i = child.index();
    uses[i] = uses[i].saturating_sub(1);
    let operand = if uses[i] == 0 {
        memo[i].take()
    } else {
        memo[i].clone()
    };
    operand.ok_or_else(|| CompileError::malformed_node("operand was not compiled", parent.clone()))
}

fn compile_frame<'a>(frame: ExprFrame<'a, Compiled<'a>>) -> Result<Compiled<'a>, CompileError> {
    let source = frame.source;
    let (output, depth) = match frame.layer {
        Layer::Literal(v) => (
            Output::Evaluator(Evaluator::Value(ValueEvaluator::Constant(v.clone()))),
            0,
        ),
        Layer::Regex(p) => (Output::Pattern(compile_pattern(p, source)?), 0),
        Layer::Field(path) => (
            Output::Evaluator(Evaluator::Value(ValueEvaluator::Field(path.clone()))),
            0,
        ),
        Layer::Unary(op, operand) => {
            let depth = operand.depth + 1;
            let operand = operand.condition()?;
            let condition = match op {
                UnaryOp::Not => Condition::not(operand),
                UnaryOp::Truthy => operand,
            };
            (Output::Evaluator(Evaluator::Condition(condition)), depth)
        }
        Layer::Binary(op @ (BinaryOp::And | BinaryOp::Or), left, right) => {
            let depth = left.depth_within(op).max(right.depth_within(op));
            let terms = join(left.terms(op)?, right.terms(op)?);
            (Output::Junction(op, terms), depth)
        }
        Layer::Binary(op, left, right) => {
            let depth = left.depth.max(right.depth) + 1;
            (
                Output::Evaluator(Evaluator::Condition(compile_binary(op, left, right)?)),
                depth,
            )
        }
    };

    if depth > MAX_NESTING {
        return Err(CompileError::too_deep(depth, MAX_NESTING, source.clone()));
    }
    Ok(Compiled {
        source,
        output,
        depth,
    })
}

fn compile_binary(op: BinaryOp, left: Compiled<'_>, right: Compiled<'_>) -> Result<Condition, CompileError> {
    let comparison: fn(&Value, &Value) -> bool = match op {
        BinaryOp::Eq => semantics::equals,
        BinaryOp::Neq => semantics::not_equals,
        BinaryOp::Gt => semantics::greater,
        BinaryOp::Gte => semantics::greater_or_equal,
        BinaryOp::Lt => semantics::less,
        BinaryOp::Lte => semantics::less_or_equal,
        BinaryOp::RegexEq | BinaryOp::RegexNeq => {
            let operand = left.value()?;
            let re = right.pattern(op)?;
            return Ok(Condition::regex(operand, re, op == BinaryOp::RegexEq));
        }
        BinaryOp::In | BinaryOp::NotIn => {
            let needle = left.value()?;
            let haystack = right.collection(op)?;
            let membership: fn(&Value, &Value) -> bool = if op == BinaryOp::In {
                semantics::is_member
            } else {
                semantics::not_member
            };
            return Ok(Condition::compare(needle, haystack, membership));
        }
        BinaryOp::And => return Ok(Condition::and(left.condition()?, right.condition()?)),
        BinaryOp::Or => return Ok(Condition::or(left.condition()?, right.condition()?)),
    };

    Ok(Condition::compare(left.value()?, right.value()?, comparison))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Event;
    use serde_json::json;
    use slog::Discard;
    use std::time::{Duration, Instant};

    fn compiler() -> Compiler {
        Compiler::new(&Logger::root(Discard, o!()))
    }

    fn src(text: &str) -> SourceWithMetadata {
        SourceWithMetadata::new("unit.conf", 1, 1, text)
    }

    fn eval_bool(arena: &ExprArena, root: ExprId, event: &dyn Event) -> bool {
        compiler()
            .compile(arena, root)
            .unwrap()
            .into_condition()
            .unwrap()
            .evaluate(event)
    }

    #[test]
    fn literal_compiles_to_constant_value() {
        let mut arena = ExprArena::new();
        let five = arena.literal(src("5"), 5i64).unwrap();
        let e = compiler().compile(&arena, five).unwrap();
        assert!(!e.is_boolean());
        assert_eq!(*e.evaluate(&Value::Null), Value::Integer(5));
    }

    #[test]
    fn field_compiles_to_lookup() {
        let mut arena = ExprArena::new();
        let f = arena.field(src("[a][b]"), "[a][b]").unwrap();
        let e = compiler().compile(&arena, f).unwrap();
        let event = Value::from(json!({"a": {"b": 3}}));
        assert_eq!(*e.evaluate(&event), Value::Integer(3));
        assert!(e.evaluate(&Value::Null).is_absent());
    }

    #[test]
    fn string_literal_on_right_of_regex_is_a_pattern() {
        let mut arena = ExprArena::new();
        let msg = arena.field(src("[msg]"), "msg").unwrap();
        let pat = arena.literal(src("\"^err\""), "^err").unwrap();
        let m = arena.binary(src("[msg] =~ \"^err\""), BinaryOp::RegexEq, msg, pat).unwrap();
        assert!(eval_bool(&arena, m, &Value::from(json!({"msg": "error: x"}))));
        assert!(!eval_bool(&arena, m, &Value::from(json!({"msg": "no error"}))));
    }

    #[test]
    fn regex_right_operand_must_be_pattern() {
        let mut arena = ExprArena::new();
        let msg = arena.field(src("[msg]"), "msg").unwrap();
        let other = arena.field(src("[pattern]"), "pattern").unwrap();
        let m = arena.binary(src("[msg] =~ [pattern]"), BinaryOp::RegexEq, msg, other).unwrap();
        let err = compiler().compile(&arena, m).unwrap_err();
        assert!(matches!(
            err,
            CompileError::PatternRequired { operator: "=~", found: "a field reference", .. }
        ));
        assert_eq!(err.location().text, "[pattern]");
    }

    #[test]
    fn pattern_outside_regex_operator_is_rejected() {
        let mut arena = ExprArena::new();
        let msg = arena.field(src("[msg]"), "msg").unwrap();
        let re = arena.regex(src("/x/"), "x");
        let eq = arena.binary(src("[msg] == /x/"), BinaryOp::Eq, msg, re).unwrap();
        let err = compiler().compile(&arena, eq).unwrap_err();
        assert!(matches!(err, CompileError::MisplacedPattern { .. }));
        assert_eq!(err.location().text, "/x/");

        let alone = compiler().compile(&arena, re).unwrap_err();
        assert!(matches!(alone, CompileError::MisplacedPattern { .. }));
    }

    #[test]
    fn membership_literal_must_be_collection() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let n = arena.literal(src("5"), 5i64).unwrap();
        let m = arena.binary(src("[a] in 5"), BinaryOp::In, a, n).unwrap();
        let err = compiler().compile(&arena, m).unwrap_err();
        assert!(matches!(
            err,
            CompileError::IncompatibleOperand { operator: "in", found: "integer", .. }
        ));
    }

    #[test]
    fn connectives_coerce_values_through_truthiness() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let b = arena.field(src("[b]"), "b").unwrap();
        let and = arena.binary(src("[a] and [b]"), BinaryOp::And, a, b).unwrap();
        assert!(eval_bool(&arena, and, &Value::from(json!({"a": "x", "b": 0}))));
        assert!(!eval_bool(&arena, and, &Value::from(json!({"a": "", "b": 1}))));
        assert!(!eval_bool(&arena, and, &Value::from(json!({"a": "x"}))));
    }

    #[test]
    fn boolean_compared_with_literal() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let one = arena.literal(src("1"), 1i64).unwrap();
        let eq = arena.binary(src("[a] == 1"), BinaryOp::Eq, a, one).unwrap();
        let t = arena.literal(src("true"), true).unwrap();
        let outer = arena.binary(src("([a] == 1) == true"), BinaryOp::Eq, eq, t).unwrap();
        assert!(eval_bool(&arena, outer, &Value::from(json!({"a": 1}))));
        assert!(!eval_bool(&arena, outer, &Value::from(json!({"a": 2}))));
    }

    /// `x_{n+1} = x_n and x_n`: 2^depth paths through depth + 2 nodes
    fn shared_chain(arena: &mut ExprArena, depth: usize) -> ExprId {
        let a = arena.field(src("[a]"), "a").unwrap();
        let mut x = arena.truthy(src("[a]"), a).unwrap();
        for _ in 0..depth {
            x = arena.binary(src("x and x"), BinaryOp::And, x, x).unwrap();
        }
        x
    }

    #[test]
    fn shared_nodes_compile_once() {
        let mut arena = ExprArena::new();
        let root = shared_chain(&mut arena, 22);
        let node = arena.get(root).unwrap();
        assert_eq!(Reachable::walk(&arena, node).unwrap().len(), 24);

        let started = Instant::now();
        let condition = compiler().compile(&arena, root).unwrap().into_condition().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        let started = Instant::now();
        assert!(!condition.evaluate(&Value::from(json!({}))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn small_shared_chain_still_evaluates_every_path() {
        let mut arena = ExprArena::new();
        let root = shared_chain(&mut arena, 6);
        assert!(eval_bool(&arena, root, &Value::from(json!({"a": 1}))));
        assert!(!eval_bool(&arena, root, &Value::from(json!({"a": ""}))));
    }

    #[test]
    fn long_connective_chains_do_not_nest() {
        const TERMS: usize = 100_000;
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let x = arena.truthy(src("[a]"), a).unwrap();

        let mut left_deep = x;
        for _ in 0..TERMS {
            left_deep = arena.binary(src("... and [a]"), BinaryOp::And, left_deep, x).unwrap();
        }
        let mut right_deep = x;
        for _ in 0..TERMS {
            right_deep = arena.binary(src("[a] or ..."), BinaryOp::Or, x, right_deep).unwrap();
        }

        let yes = Value::from(json!({"a": true}));
        let no = Value::from(json!({"a": false}));
        assert!(eval_bool(&arena, left_deep, &yes));
        assert!(!eval_bool(&arena, left_deep, &no));
        assert!(eval_bool(&arena, right_deep, &yes));
        assert!(!eval_bool(&arena, right_deep, &no));
    }

    #[test]
    fn mixed_connectives_keep_grouping() {
        // ([a] or [b]) and [c]
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let b = arena.field(src("[b]"), "b").unwrap();
        let c = arena.field(src("[c]"), "c").unwrap();
        let or = arena.binary(src("[a] or [b]"), BinaryOp::Or, a, b).unwrap();
        let and = arena.binary(src("([a] or [b]) and [c]"), BinaryOp::And, or, c).unwrap();

        assert!(eval_bool(&arena, and, &Value::from(json!({"b": 1, "c": 1}))));
        assert!(!eval_bool(&arena, and, &Value::from(json!({"a": 1}))));
        assert!(!eval_bool(&arena, and, &Value::from(json!({"c": 1}))));
    }

    #[test]
    fn nesting_beyond_limit_is_rejected() {
        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let mut x = a;
        for _ in 0..1000 {
            x = arena.not(src("!"), x).unwrap();
        }
        let err = compiler().compile(&arena, x).unwrap_err();
        assert!(matches!(
            err,
            CompileError::TooDeep { depth, limit: MAX_NESTING, .. } if depth == MAX_NESTING + 1
        ));

        let mut arena = ExprArena::new();
        let a = arena.field(src("[a]"), "a").unwrap();
        let mut x = a;
        for _ in 0..MAX_NESTING {
            x = arena.not(src("!"), x).unwrap();
        }
        // an even number of negations
        assert!(eval_bool(&arena, x, &Value::from(json!({"a": 1}))));
    }

    #[test]
    fn foreign_root_is_malformed() {
        let mut other = ExprArena::new();
        let id = other.literal(src("1"), 1i64).unwrap();
        let arena = ExprArena::new();
        let err = compiler().compile(&arena, id).unwrap_err();
        assert!(matches!(err, CompileError::MalformedNode { .. }));
    }
}
