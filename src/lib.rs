//! Compile pipeline conditional expressions into evaluators.
//!
//! An expression tree is built in an [`ExprArena`] (directly, or from JSON
//! via [`loader::ExprSpec`]), then compiled once into a shared
//! [`Condition`] that can be evaluated against any number of events from
//! any number of threads.
//!
//! ```
//! use condexpr::{BinaryOp, ConditionCompiler, ExprArena, SourceWithMetadata, Value};
//! use slog::{o, Discard, Logger};
//!
//! let src = |text: &str| SourceWithMetadata::synthetic(text);
//! let mut arena = ExprArena::new();
//! let status = arena.field(src("[status]"), "status").unwrap();
//! let ok = arena.literal(src("200"), 200i64).unwrap();
//! let root = arena.binary(src("[status] == 200"), BinaryOp::Eq, status, ok).unwrap();
//!
//! let logger = Logger::root(Discard, o!());
//! let condition = ConditionCompiler::new(&logger).compile_condition(&arena, root).unwrap();
//! let event = Value::from(serde_json::json!({"status": 200}));
//! assert!(condition.evaluate(&event));
//! ```

pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod expr;
pub mod hybrid_regex;
pub mod loader;
pub mod pipeline;
pub mod semantics;
pub mod source;
pub mod value;

pub use compiler::Compiler;
pub use error::{CompileError, MalformedExpressionError};
pub use eval::{Condition, Evaluator, ValueEvaluator};
pub use expr::{BinaryOp, ExprArena, ExprId, Node, UnaryOp};
pub use pipeline::{BranchPoint, ConditionCompiler};
pub use source::SourceWithMetadata;
pub use value::{Event, FieldPath, Value};
