//! Error reporting for expression trees
//!
//! Two renderings: [`format`] produces the compact single-location form used
//! in logs, `<id>:<line>:<column>: <message>` followed by the offending
//! snippet, and [`render_fancy`] draws a full miette report for terminals.

use std::fmt::Write;

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};

use crate::error::{CompileError, MalformedExpressionError};
use crate::expr::BinaryOp;
use crate::source::SourceWithMetadata;

/// An error tied to the source of one expression node
pub trait Located: Diagnostic {
    fn location(&self) -> &SourceWithMetadata;
}

impl Located for MalformedExpressionError {
    fn location(&self) -> &SourceWithMetadata {
        MalformedExpressionError::location(self)
    }
}

impl Located for CompileError {
    fn location(&self) -> &SourceWithMetadata {
        CompileError::location(self)
    }
}

/// Compact report: location and message, then the node's first snippet line
/// with a caret underline.
pub fn format<E: Located + ?Sized>(error: &E) -> String {
    let location = error.location();
    let mut out = format!("{location}: {error}");

    let mut lines = location.text.lines();
    if let Some(first) = lines.next().filter(|l| !l.trim().is_empty()) {
        let more = if lines.next().is_some() { " ..." } else { "" };
        let _ = write!(out, "\n    {first}{more}\n    {}", "^".repeat(first.chars().count()));
    }
    if let Some(help) = error.help() {
        let _ = write!(out, "\n  help: {help}");
    }
    out
}

/// Full miette report without colors, suitable for stderr
pub fn render_fancy(error: &dyn Diagnostic) -> String {
    let mut out = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    if handler.render_report(&mut out, error).is_err() {
        // fall back to the plain message
        out = error.to_string();
    }
    out
}

/// "Did you mean" hint for an unrecognized operator spelling
pub fn suggest_operator(invalid: &str) -> Option<String> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for op in BinaryOp::ALL {
        for candidate in [op.name(), op.symbol()] {
            let distance = levenshtein_distance(invalid, candidate);
            if distance < best_distance && distance <= 2 {
                best_distance = distance;
                best_match = Some(candidate);
            }
        }
    }

    best_match.map(|s| format!("Did you mean '{}'?", s))
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let mut matrix = vec![vec![0; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        matrix[0][j] = j;
    }

    for (i, c1) in a.iter().enumerate() {
        for (j, c2) in b.iter().enumerate() {
            let cost = if c1 == c2 { 0 } else { 1 };
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[a.len()][b.len()]
}
