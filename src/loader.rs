//! Serialized expression trees
//!
//! The condition grammar is parsed elsewhere; this module accepts the parsed
//! tree as JSON and rebuilds it in an [`ExprArena`]:
//!
//! ```json
//! {"kind": "binary", "op": "==",
//!  "left":  {"kind": "field", "path": "[status]"},
//!  "right": {"kind": "literal", "value": 200},
//!  "source": {"line": 3, "column": 8, "text": "[status] == 200"}}
//! ```
//!
//! Operators may be spelled by name (`"not_in"`) or by symbol (`"not in"`).

use serde::Deserialize;

use crate::diagnostics::suggest_operator;
use crate::error::MalformedExpressionError;
use crate::expr::{BinaryOp, ExprArena, ExprId, UnaryOp};
use crate::source::SourceWithMetadata;
use crate::value::Value;

/// Optional location of a serialized node. Missing parts fall back to the
/// loader's default id, position 0:0, and a rendering of the node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    pub id: Option<String>,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprSpec {
    Literal {
        value: serde_json::Value,
        #[serde(default)]
        source: SourceSpec,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        source: SourceSpec,
    },
    Field {
        path: String,
        #[serde(default)]
        source: SourceSpec,
    },
    Not {
        operand: Box<ExprSpec>,
        #[serde(default)]
        source: SourceSpec,
    },
    Truthy {
        operand: Box<ExprSpec>,
        #[serde(default)]
        source: SourceSpec,
    },
    Binary {
        op: String,
        left: Box<ExprSpec>,
        right: Box<ExprSpec>,
        #[serde(default)]
        source: SourceSpec,
    },
}

impl ExprSpec {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    fn source_spec(&self) -> &SourceSpec {
        match self {
            ExprSpec::Literal { source, .. }
            | ExprSpec::Regex { source, .. }
            | ExprSpec::Field { source, .. }
            | ExprSpec::Not { source, .. }
            | ExprSpec::Truthy { source, .. }
            | ExprSpec::Binary { source, .. } => source,
        }
    }

    /// Add this tree to `arena`, children first, and return the root id.
    ///
    /// Recursion depth is bounded by serde_json's nesting limit.
    pub fn build(
        &self,
        arena: &mut ExprArena,
        default_id: &str,
    ) -> Result<ExprId, MalformedExpressionError> {
        let spec = self.source_spec();
        let locate = |rendered: String| {
            SourceWithMetadata::new(
                spec.id.as_deref().unwrap_or(default_id),
                spec.line,
                spec.column,
                spec.text.clone().unwrap_or(rendered),
            )
        };

        match self {
            ExprSpec::Literal { value, .. } => {
                let value = Value::from(value.clone());
                arena.literal(locate(value.to_string()), value)
            }
            ExprSpec::Regex { pattern, .. } => {
                let source = locate(format!("/{}/", pattern.replace('/', "\\/")));
                Ok(arena.regex(source, pattern.as_str()))
            }
            ExprSpec::Field { path, .. } => arena.field(locate(path.clone()), path),
            ExprSpec::Not { operand, .. } => {
                let operand = operand.build(arena, default_id)?;
                let source = locate(format!("!{}", rendered(arena, operand)));
                arena.unary(source, UnaryOp::Not, operand)
            }
            ExprSpec::Truthy { operand, .. } => {
                let operand = operand.build(arena, default_id)?;
                let source = locate(rendered(arena, operand));
                arena.unary(source, UnaryOp::Truthy, operand)
            }
            ExprSpec::Binary {
                op, left, right, ..
            } => {
                let Some(op) = BinaryOp::lookup(op) else {
                    return Err(MalformedExpressionError::unknown_operator(
                        op.clone(),
                        suggest_operator(op.trim()),
                        locate(op.clone()),
                    ));
                };
                let left = left.build(arena, default_id)?;
                let right = right.build(arena, default_id)?;
                let source = locate(format!(
                    "({} {} {})",
                    rendered(arena, left),
                    op,
                    rendered(arena, right)
                ));
                arena.binary(source, op, left, right)
            }
        }
    }
}

fn rendered(arena: &ExprArena, id: ExprId) -> String {
    arena.render(id).unwrap_or_default()
}
