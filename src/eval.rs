//! Compiled evaluators
//!
//! A [`Condition`] is a shared, immutable closure over already-compiled
//! children; it borrows the event only for the duration of a call and never
//! holds state between calls, so one compiled graph can be evaluated from any
//! number of threads at once.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::hybrid_regex::HybridRegex;
use crate::semantics;
use crate::value::{Event, FieldPath, Value, ABSENT};

type ConditionFn = dyn Fn(&dyn Event) -> bool + Send + Sync;

/// Compiled boolean-producing node
#[derive(Clone)]
pub struct Condition(Arc<ConditionFn>);

impl Condition {
    pub fn new(f: impl Fn(&dyn Event) -> bool + Send + Sync + 'static) -> Self {
        Condition(Arc::new(f))
    }

    pub fn constant(b: bool) -> Self {
        Self::new(move |_| b)
    }

    #[inline]
    pub fn evaluate(&self, event: &dyn Event) -> bool {
        (self.0)(event)
    }

    /// `right` runs only if `left` is true
    pub fn and(left: Condition, right: Condition) -> Self {
        Self::new(move |event| left.evaluate(event) && right.evaluate(event))
    }

    /// `right` runs only if `left` is false
    pub fn or(left: Condition, right: Condition) -> Self {
        Self::new(move |event| left.evaluate(event) || right.evaluate(event))
    }

    /// Flattened `and` chain: terms run in order until one is false
    pub fn all(terms: Vec<Condition>) -> Self {
        Self::new(move |event| terms.iter().all(|t| t.evaluate(event)))
    }

    /// Flattened `or` chain: terms run in order until one is true
    pub fn any(terms: Vec<Condition>) -> Self {
        Self::new(move |event| terms.iter().any(|t| t.evaluate(event)))
    }

    pub fn not(inner: Condition) -> Self {
        Self::new(move |event| !inner.evaluate(event))
    }

    pub fn truthy(operand: ValueEvaluator) -> Self {
        Self::new(move |event| semantics::truthy(&operand.evaluate(event)))
    }

    /// Binary comparison; `left` is always evaluated before `right`.
    pub fn compare(
        left: ValueEvaluator,
        right: ValueEvaluator,
        op: fn(&Value, &Value) -> bool,
    ) -> Self {
        Self::new(move |event| {
            let l = left.evaluate(event);
            let r = right.evaluate(event);
            op(&l, &r)
        })
    }

    pub fn regex(operand: ValueEvaluator, re: HybridRegex, expected: bool) -> Self {
        Self::new(move |event| semantics::regex_match(&operand.evaluate(event), &re) == expected)
    }

    /// True when both handles point at the same compiled closure
    pub fn ptr_eq(&self, other: &Condition) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({:p})", Arc::as_ptr(&self.0))
    }
}

/// Compiled value-producing node
#[derive(Debug, Clone)]
pub enum ValueEvaluator {
    Constant(Value),
    Field(FieldPath),
    /// boolean node used as a comparison operand
    Condition(Condition),
}

impl ValueEvaluator {
    /// Borrows from the event or the compiled constant; only a boolean
    /// operand is materialized, which needs no heap allocation.
    #[inline]
    pub fn evaluate<'a>(&'a self, event: &'a dyn Event) -> Cow<'a, Value> {
        match self {
            ValueEvaluator::Constant(v) => Cow::Borrowed(v),
            ValueEvaluator::Field(path) => Cow::Borrowed(event.get(path).unwrap_or(&ABSENT)),
            ValueEvaluator::Condition(c) => Cow::Owned(Value::Boolean(c.evaluate(event))),
        }
    }
}

/// Result of compiling one expression node
#[derive(Debug, Clone)]
pub enum Evaluator {
    Condition(Condition),
    Value(ValueEvaluator),
}

impl Evaluator {
    pub fn evaluate<'a>(&'a self, event: &'a dyn Event) -> Cow<'a, Value> {
        match self {
            Evaluator::Condition(c) => Cow::Owned(Value::Boolean(c.evaluate(event))),
            Evaluator::Value(v) => v.evaluate(event),
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Evaluator::Condition(_))
    }

    pub fn as_condition(&self) -> Option<&Condition> {
        match self {
            Evaluator::Condition(c) => Some(c),
            Evaluator::Value(_) => None,
        }
    }

    pub fn into_condition(self) -> Option<Condition> {
        match self {
            Evaluator::Condition(c) => Some(c),
            Evaluator::Value(_) => None,
        }
    }

    /// Boolean view used by connectives: values go through truthiness
    pub fn into_truthy_condition(self) -> Condition {
        match self {
            Evaluator::Condition(c) => c,
            Evaluator::Value(v) => Condition::truthy(v),
        }
    }

    /// Value view used by comparisons: booleans become `Value::Boolean`
    pub fn into_value(self) -> ValueEvaluator {
        match self {
            Evaluator::Condition(c) => ValueEvaluator::Condition(c),
            Evaluator::Value(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(calls: &Arc<AtomicUsize>, result: bool) -> Condition {
        let calls = calls.clone();
        Condition::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            result
        })
    }

    #[test]
    fn and_skips_right_when_left_false() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Condition::and(Condition::constant(false), recorder(&calls, true));
        assert!(!c.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let c = Condition::and(Condition::constant(true), recorder(&calls, true));
        assert!(c.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_skips_right_when_left_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Condition::or(Condition::constant(true), recorder(&calls, false));
        assert!(c.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let c = Condition::or(Condition::constant(false), recorder(&calls, false));
        assert!(!c.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_and_any_stop_at_deciding_term() {
        let calls = Arc::new(AtomicUsize::new(0));
        let all = Condition::all(vec![
            recorder(&calls, true),
            Condition::constant(false),
            recorder(&calls, true),
        ]);
        assert!(!all.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let any = Condition::any(vec![
            recorder(&calls, false),
            Condition::constant(true),
            recorder(&calls, false),
        ]);
        assert!(any.evaluate(&Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(Condition::all(vec![]).evaluate(&Value::Null));
        assert!(!Condition::any(vec![]).evaluate(&Value::Null));
    }

    #[test]
    fn value_evaluator_borrows_event() {
        let event = Value::from(json!({"a": {"b": "deep"}}));
        let field = ValueEvaluator::Field(FieldPath::parse("[a][b]").unwrap());
        let v = field.evaluate(&event);
        assert!(matches!(v, Cow::Borrowed(Value::String(s)) if s == "deep"));

        let missing = ValueEvaluator::Field(FieldPath::parse("nope").unwrap());
        assert!(missing.evaluate(&event).is_absent());
    }

    #[test]
    fn boolean_operand_materializes() {
        let v = ValueEvaluator::Condition(Condition::constant(true));
        assert_eq!(*v.evaluate(&Value::Null), Value::Boolean(true));
    }

    #[test]
    fn conditions_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Condition>();
        assert_send_sync::<Evaluator>();

        let c = Condition::compare(
            ValueEvaluator::Field(FieldPath::parse("n").unwrap()),
            ValueEvaluator::Constant(Value::Integer(10)),
            semantics::less,
        );
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = c.clone();
                std::thread::spawn(move || {
                    let event = Value::from(json!({ "n": i * 5 }));
                    c.evaluate(&event)
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![true, true, false, false]);
    }
}
