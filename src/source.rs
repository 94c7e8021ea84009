use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Where an expression node came from in the pipeline config.
///
/// Attached to every node for diagnostics only; evaluation never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct SourceWithMetadata {
    /// config file name, or some other identifier for the config origin
    pub id: Arc<str>,
    pub line: usize,
    pub column: usize,
    /// the original text of the node
    pub text: String,
}

impl SourceWithMetadata {
    pub fn new(id: impl Into<Arc<str>>, line: usize, column: usize, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            line,
            column,
            text: text.into(),
        }
    }

    /// Placeholder used when nodes are built programmatically
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self::new("<generated>", 0, 0, text)
    }

    /// Same location, different snippet
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            line: self.line,
            column: self.column,
            text: text.into(),
        }
    }
}

impl fmt::Display for SourceWithMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_id_line_column() {
        let src = SourceWithMetadata::new("main.conf", 12, 4, "[a] == 1");
        assert_eq!(src.to_string(), "main.conf:12:4");
    }

    #[test]
    fn with_text_keeps_location() {
        let src = SourceWithMetadata::new("main.conf", 3, 9, "[a] == 1");
        let child = src.with_text("[a]");
        assert_eq!(child.id, src.id);
        assert_eq!((child.line, child.column), (3, 9));
        assert_eq!(child.text, "[a]");
    }
}
