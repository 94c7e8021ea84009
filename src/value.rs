//! Runtime values and the event lookup capability
//!
//! `Value` is the dynamically typed value read from an event or produced by a
//! literal. `Absent` is a first-class kind: it is what a lookup of a missing
//! field yields, and it is distinct from an explicit `Null`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use thiserror::Error;

/// Dynamically typed event value.
///
/// The derived `PartialEq` is strict structural equality (an `Integer(1)` is
/// not a `Float(1.0)`); the condition language's own equality lives in
/// [`crate::semantics::equals`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Absent,
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

pub(crate) static ABSENT: Value = Value::Absent;

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Textual form used where the language coerces a value to a string
    /// (left operand of `=~`). Absent and null become the empty string.
    /// Floats use the shortest form that reads back to the same value, as
    /// serde_json writes them (`1.0`, `1e16`).
    pub fn coerce_to_str(&self) -> Cow<'_, str> {
        match self {
            Value::Absent | Value::Null => Cow::Borrowed(""),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Boolean(true) => Cow::Borrowed("true"),
            Value::Boolean(false) => Cow::Borrowed("false"),
            Value::Integer(i) => Cow::Owned(itoa::Buffer::new().format(*i).to_owned()),
            Value::Float(x) => Cow::Owned(ryu::Buffer::new().format(*x).to_owned()),
            Value::Timestamp(t) => Cow::Owned(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Array(_) | Value::Map(_) => Cow::Owned(self.to_string()),
        }
    }

    /// Walk `path` from this value. Maps are keyed by segment, arrays by
    /// integer segment (negative counts from the end).
    pub fn lookup(&self, path: &FieldPath) -> Option<&Value> {
        path.segments().iter().try_fold(self, |current, segment| match current {
            Value::Map(map) => map.get(segment.as_str()),
            Value::Array(items) => index_array(items, segment),
            _ => None,
        })
    }
}

fn index_array<'a>(items: &'a [Value], segment: &str) -> Option<&'a Value> {
    let idx: i64 = segment.parse().ok()?;
    let idx = if idx < 0 {
        items.len().checked_sub(idx.unsigned_abs() as usize)?
    } else {
        idx as usize
    };
    items.get(idx)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "<absent>"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Array(items) => write!(f, "[{}]", items.iter().join(", ")),
            Value::Map(map) => write!(
                f,
                "{{{}}}",
                map.iter().map(|(k, v)| format!("{:?}: {}", k, v)).join(", ")
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Field paths
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,
    #[error("empty segment at byte {0}")]
    EmptySegment(usize),
    #[error("unbalanced brackets")]
    Unbalanced,
    #[error("unexpected '{found}' at byte {at}")]
    Unexpected { found: char, at: usize },
}

/// A path into an event record, e.g. `status` or `[request][headers][host]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(s: &str) -> Result<Self, FieldPathError> {
        if s.is_empty() {
            return Err(FieldPathError::Empty);
        }

        if !s.starts_with('[') {
            if let Some((at, found)) = s.char_indices().find(|(_, c)| *c == '[' || *c == ']') {
                return Err(FieldPathError::Unexpected { found, at });
            }
            return Ok(Self {
                segments: vec![s.to_owned()],
            });
        }

        let mut segments = Vec::new();
        let mut rest = s;
        let mut offset = 0;
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[').ok_or(FieldPathError::Unexpected {
                found: rest.chars().next().unwrap_or('['),
                at: offset,
            })?;
            let close = inner.find(']').ok_or(FieldPathError::Unbalanced)?;
            let segment = &inner[..close];
            if segment.is_empty() {
                return Err(FieldPathError::EmptySegment(offset));
            }
            if let Some(at) = segment.find('[') {
                return Err(FieldPathError::Unexpected {
                    found: '[',
                    at: offset + 1 + at,
                });
            }
            segments.push(segment.to_owned());
            offset += close + 2;
            rest = &inner[close + 1..];
        }

        Ok(Self { segments })
    }

    pub fn from_segments<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "[{}]", segment)?;
        }
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

/// The only event capability conditionals need: read a field.
///
/// `None` means the path does not exist; evaluators treat it as `Absent`.
pub trait Event {
    fn get(&self, path: &FieldPath) -> Option<&Value>;
}

impl Event for Value {
    fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.lookup(path)
    }
}

impl Event for BTreeMap<String, Value> {
    fn get(&self, path: &FieldPath) -> Option<&Value> {
        let (head, rest) = path.segments().split_first()?;
        let first = BTreeMap::get(self, head.as_str())?;
        rest.iter().try_fold(first, |current, segment| match current {
            Value::Map(map) => map.get(segment.as_str()),
            Value::Array(items) => index_array(items, segment),
            _ => None,
        })
    }
}
