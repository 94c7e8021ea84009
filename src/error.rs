use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::source::SourceWithMetadata;
use crate::value::FieldPathError;

/// Label span covering the whole snippet of a node
fn snippet_span(location: &SourceWithMetadata) -> SourceSpan {
    (0, location.text.len()).into()
}

/// Expression tree shape errors, raised while the tree is being built
#[allow(dead_code)] // Fields are used by miette's derive macros
#[derive(Debug, Clone, Diagnostic, Error)]
pub enum MalformedExpressionError {
    #[error("{role} operand of '{parent}' is not a node of this expression tree")]
    #[diagnostic(
        code(condexpr::unknown_node),
        help("Build child expressions in the same arena before their parent")
    )]
    UnknownNode {
        parent: &'static str,
        role: &'static str,
        location: SourceWithMetadata,
        #[label("required operand missing")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Unsupported literal of kind {kind}")]
    #[diagnostic(
        code(condexpr::unsupported_literal),
        help("Literals may be strings, numbers, booleans, regex patterns, or arrays of those")
    )]
    UnsupportedLiteral {
        kind: &'static str,
        location: SourceWithMetadata,
        #[label("unsupported literal")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Invalid field reference '{path}': {reason}")]
    #[diagnostic(
        code(condexpr::invalid_field_path),
        help("Field references look like [field] or [outer][inner]")
    )]
    InvalidFieldPath {
        path: String,
        reason: FieldPathError,
        location: SourceWithMetadata,
        #[label("invalid field reference")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Unknown operator '{found}'")]
    #[diagnostic(code(condexpr::unknown_operator))]
    UnknownOperator {
        found: String,
        location: SourceWithMetadata,
        #[label("unknown operator")]
        span: SourceSpan,
        #[source_code]
        src: String,
        #[help]
        suggestion: Option<String>,
    },
}

impl MalformedExpressionError {
    pub fn unknown_node(
        parent: &'static str,
        role: &'static str,
        location: SourceWithMetadata,
    ) -> Self {
        MalformedExpressionError::UnknownNode {
            parent,
            role,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn unsupported_literal(kind: &'static str, location: SourceWithMetadata) -> Self {
        MalformedExpressionError::UnsupportedLiteral {
            kind,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn invalid_field_path(
        path: impl Into<String>,
        reason: FieldPathError,
        location: SourceWithMetadata,
    ) -> Self {
        MalformedExpressionError::InvalidFieldPath {
            path: path.into(),
            reason,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn unknown_operator(
        found: impl Into<String>,
        suggestion: Option<String>,
        location: SourceWithMetadata,
    ) -> Self {
        MalformedExpressionError::UnknownOperator {
            found: found.into(),
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
            suggestion,
        }
    }

    pub fn location(&self) -> &SourceWithMetadata {
        match self {
            MalformedExpressionError::UnknownNode { location, .. }
            | MalformedExpressionError::UnsupportedLiteral { location, .. }
            | MalformedExpressionError::InvalidFieldPath { location, .. }
            | MalformedExpressionError::UnknownOperator { location, .. } => location,
        }
    }
}

/// Static problems found while compiling a well-shaped expression tree
#[allow(dead_code)] // Fields are used by miette's derive macros
#[derive(Debug, Clone, Diagnostic, Error)]
pub enum CompileError {
    #[error("Invalid regex pattern /{pattern}/: {details}")]
    #[diagnostic(code(condexpr::regex))]
    InvalidRegex {
        pattern: String,
        details: String,
        location: SourceWithMetadata,
        #[label("regex compilation failed here")]
        span: SourceSpan,
        #[source_code]
        src: String,
        #[help]
        fix_suggestion: Option<String>,
    },

    #[error("Regex pattern /{pattern}/ used outside of '=~' or '!~'")]
    #[diagnostic(
        code(condexpr::misplaced_pattern),
        help("A regex pattern can only be the right operand of '=~' or '!~'")
    )]
    MisplacedPattern {
        pattern: String,
        location: SourceWithMetadata,
        #[label("pattern not allowed here")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Right operand of '{operator}' must be a regex pattern, found {found}")]
    #[diagnostic(
        code(condexpr::pattern_required),
        help("Write the pattern as a literal, e.g. [message] =~ /error/")
    )]
    PatternRequired {
        operator: &'static str,
        found: &'static str,
        location: SourceWithMetadata,
        #[label("expected a pattern")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Operator '{operator}' cannot take a {found} literal as its right operand")]
    #[diagnostic(
        code(condexpr::incompatible_operand),
        help("Membership tests need an array or a string on the right")
    )]
    IncompatibleOperand {
        operator: &'static str,
        found: &'static str,
        location: SourceWithMetadata,
        #[label("incompatible operand")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Condition '{rendered}' does not produce a boolean")]
    #[diagnostic(
        code(condexpr::non_boolean_condition),
        help("Compare the value, or test it on its own as a truthy value")
    )]
    NonBooleanCondition {
        rendered: String,
        location: SourceWithMetadata,
        #[label("value used as a condition")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Expression nests {depth} evaluators deep, more than the limit of {limit}")]
    #[diagnostic(
        code(condexpr::too_deep),
        help("Split the conditional, or chain terms with 'and'/'or', which do not add nesting")
    )]
    TooDeep {
        depth: usize,
        limit: usize,
        location: SourceWithMetadata,
        #[label("limit exceeded here")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },

    #[error("Malformed expression tree: {reason}")]
    #[diagnostic(code(condexpr::internal))]
    MalformedNode {
        reason: String,
        location: SourceWithMetadata,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: String,
    },
}

impl CompileError {
    pub fn invalid_regex(
        pattern: impl Into<String>,
        details: impl Into<String>,
        location: SourceWithMetadata,
    ) -> Self {
        let details = details.into();
        let fix_suggestion = if details.contains("repetition operator") {
            Some("Use .* for 'any characters' (not just *), and escape literal '*', '+' or '?'".to_string())
        } else if details.contains("unclosed") || details.contains("missing terminating") {
            Some("Check for unclosed brackets or groups: [a-z] not [a-z".to_string())
        } else {
            None
        };
        CompileError::InvalidRegex {
            pattern: pattern.into(),
            details,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
            fix_suggestion,
        }
    }

    pub fn misplaced_pattern(pattern: impl Into<String>, location: SourceWithMetadata) -> Self {
        CompileError::MisplacedPattern {
            pattern: pattern.into(),
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn pattern_required(
        operator: &'static str,
        found: &'static str,
        location: SourceWithMetadata,
    ) -> Self {
        CompileError::PatternRequired {
            operator,
            found,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn incompatible_operand(
        operator: &'static str,
        found: &'static str,
        location: SourceWithMetadata,
    ) -> Self {
        CompileError::IncompatibleOperand {
            operator,
            found,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn non_boolean_condition(rendered: impl Into<String>, location: SourceWithMetadata) -> Self {
        CompileError::NonBooleanCondition {
            rendered: rendered.into(),
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn too_deep(depth: usize, limit: usize, location: SourceWithMetadata) -> Self {
        CompileError::TooDeep {
            depth,
            limit,
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn malformed_node(reason: impl Into<String>, location: SourceWithMetadata) -> Self {
        CompileError::MalformedNode {
            reason: reason.into(),
            span: snippet_span(&location),
            src: location.text.clone(),
            location,
        }
    }

    pub fn location(&self) -> &SourceWithMetadata {
        match self {
            CompileError::InvalidRegex { location, .. }
            | CompileError::MisplacedPattern { location, .. }
            | CompileError::PatternRequired { location, .. }
            | CompileError::IncompatibleOperand { location, .. }
            | CompileError::NonBooleanCondition { location, .. }
            | CompileError::TooDeep { location, .. }
            | CompileError::MalformedNode { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Diagnostic;

    #[test]
    fn span_covers_snippet() {
        let err = CompileError::misplaced_pattern(
            "abc",
            SourceWithMetadata::new("p.conf", 2, 7, "/abc/"),
        );
        let labels: Vec<_> = err.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 0);
        assert_eq!(labels[0].len(), 5);
        assert_eq!(err.code().unwrap().to_string(), "condexpr::misplaced_pattern");
    }

    #[test]
    fn regex_hint_for_unclosed_class() {
        let err = CompileError::invalid_regex(
            "[a-z",
            "regex parse error: unclosed character class",
            SourceWithMetadata::synthetic("/[a-z/"),
        );
        assert!(err.help().is_some());
        assert_eq!(err.location().text, "/[a-z/");
    }
}
