//! Comparison and connective semantics of the condition language
//!
//! Every function here is total over all pairs of [`Value`] kinds: an absent
//! field or a type mismatch yields a defined boolean, never an error.

use std::cmp::Ordering;

use crate::hybrid_regex::HybridRegex;
use crate::value::Value;

/// absent, null, `false` and `""` are false; everything else is true
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Absent | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Integer(_)
        | Value::Float(_)
        | Value::Timestamp(_)
        | Value::Array(_)
        | Value::Map(_) => true,
    }
}

fn int_float(i: i64, x: f64) -> Option<Ordering> {
    (i as f64).partial_cmp(&x)
}

/// Language equality: numeric kinds compare by value, containers
/// structurally, and absent only equals absent.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Absent, Value::Absent) => true,
        (Value::Absent, _) | (_, Value::Absent) => false,
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Integer(i), Value::Float(x)) | (Value::Float(x), Value::Integer(i)) => {
            int_float(*i, *x) == Some(Ordering::Equal)
        }
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Timestamp(x), Value::Timestamp(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equals(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| equals(x, y)))
        }
        _ => false,
    }
}

pub fn not_equals(a: &Value, b: &Value) -> bool {
    !equals(a, b)
}

/// Ordering exists only between two numbers or two strings
pub fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(i), Value::Float(x)) => int_float(*i, *x),
        (Value::Float(x), Value::Integer(i)) => int_float(*i, *x).map(Ordering::reverse),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

pub fn greater(a: &Value, b: &Value) -> bool {
    matches!(order(a, b), Some(Ordering::Greater))
}

pub fn greater_or_equal(a: &Value, b: &Value) -> bool {
    matches!(order(a, b), Some(Ordering::Greater | Ordering::Equal))
}

pub fn less(a: &Value, b: &Value) -> bool {
    matches!(order(a, b), Some(Ordering::Less))
}

pub fn less_or_equal(a: &Value, b: &Value) -> bool {
    matches!(order(a, b), Some(Ordering::Less | Ordering::Equal))
}

/// `needle in haystack`: element equality for arrays, substring for strings
pub fn is_member(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (Value::Absent, _) | (_, Value::Absent) => false,
        (_, Value::Array(items)) => items.iter().any(|item| equals(needle, item)),
        (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
        _ => false,
    }
}

pub fn not_member(needle: &Value, haystack: &Value) -> bool {
    !is_member(needle, haystack)
}

/// Unanchored match of the value's string coercion. Numbers are formatted
/// into a stack buffer; only timestamps and containers build a string.
pub fn regex_match(value: &Value, re: &HybridRegex) -> bool {
    match value {
        Value::Integer(i) => re.is_match(itoa::Buffer::new().format(*i)),
        Value::Float(x) => re.is_match(ryu::Buffer::new().format(*x)),
        _ => re.is_match(&value.coerce_to_str()),
    }
}
