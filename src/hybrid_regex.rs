use std::borrow::Cow;

/// Regex engine for in-memory strings: Rust `regex` first, falling back to
/// PCRE2 for syntax it doesn't support (lookaround, backreferences).
///
/// Matching is unanchored in both engines.
#[derive(Clone)]
pub enum HybridRegex {
    Rust(regex::Regex),
    Pcre2(pcre2::bytes::Regex),
}

// use string representation as a heuristic for regex equality
impl PartialEq for HybridRegex {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Rust(l0), Self::Rust(r0)) => l0.as_str() == r0.as_str(),
            (Self::Pcre2(l0), Self::Pcre2(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for HybridRegex {}

impl HybridRegex {
    /// Compile `pattern`; the error carries the Rust engine's message when
    /// both engines reject it.
    pub fn new(pattern: &str) -> Result<Self, String> {
        match regex::Regex::new(pattern) {
            Ok(re) => Ok(HybridRegex::Rust(re)),
            Err(rust_err) => match pcre2::bytes::Regex::new(pattern) {
                Ok(pcre2_re) => Ok(HybridRegex::Pcre2(pcre2_re)),
                Err(_pcre2_err) => Err(rust_err.to_string()),
            },
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            HybridRegex::Rust(re) => re.is_match(text),
            HybridRegex::Pcre2(re) => re.is_match(text.as_bytes()).unwrap_or(false),
        }
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            HybridRegex::Rust(re) => Cow::Borrowed(re.as_str()),
            HybridRegex::Pcre2(re) => Cow::Borrowed(re.as_str()),
        }
    }
}

impl std::fmt::Debug for HybridRegex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Regex({})", self.as_str())
    }
}

impl std::fmt::Display for HybridRegex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
