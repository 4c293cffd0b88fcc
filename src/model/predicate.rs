//! Closed predicate grammar for condition gating
//!
//! Spawn conditions are small data-driven comparisons evaluated by the
//! engine itself. There is intentionally no expression language here:
//! scraped values are attacker-influenced and are never evaluated as code.

use crate::model::Value;
use serde::{Deserialize, Serialize};

/// A comparison applied to an attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Value equals the operand
    Eq(Value),
    /// Value differs from the operand
    Ne(Value),
    /// Numeric value is greater than the operand
    Gt(f64),
    /// Numeric value is less than the operand
    Lt(f64),
    /// Value is one of the operands
    In(Vec<Value>),
}

impl Predicate {
    /// Evaluates the predicate against a single scalar value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Eq(operand) => value == operand,
            Predicate::Ne(operand) => value != operand,
            Predicate::Gt(operand) => value.as_number().map(|n| n > *operand).unwrap_or(false),
            Predicate::Lt(operand) => value.as_number().map(|n| n < *operand).unwrap_or(false),
            Predicate::In(operands) => operands.contains(value),
        }
    }

    /// Evaluates the predicate against every member of a value.
    ///
    /// A list passes only when all of its members pass; an absent value
    /// passes vacuously, matching the behavior of gating on a field that
    /// was never extracted.
    pub fn matches_all(&self, value: &Value) -> bool {
        value.members().iter().all(|member| self.matches(member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_ne() {
        let eq = Predicate::Eq(Value::Text("new".into()));
        assert!(eq.matches(&Value::Text("new".into())));
        assert!(!eq.matches(&Value::Text("used".into())));

        let ne = Predicate::Ne(Value::Int(0));
        assert!(ne.matches(&Value::Int(1)));
        assert!(!ne.matches(&Value::Int(0)));
    }

    #[test]
    fn test_numeric_comparisons() {
        let gt = Predicate::Gt(5.0);
        assert!(gt.matches(&Value::Int(10)));
        assert!(gt.matches(&Value::Float(5.5)));
        assert!(!gt.matches(&Value::Int(5)));
        // non-numeric values never pass a numeric comparison
        assert!(!gt.matches(&Value::Text("10".into())));

        let lt = Predicate::Lt(5.0);
        assert!(lt.matches(&Value::Int(4)));
        assert!(!lt.matches(&Value::Int(6)));
    }

    #[test]
    fn test_in() {
        let within = Predicate::In(vec![Value::Text("a".into()), Value::Text("b".into())]);
        assert!(within.matches(&Value::Text("a".into())));
        assert!(!within.matches(&Value::Text("c".into())));
    }

    #[test]
    fn test_matches_all_over_lists() {
        let gt = Predicate::Gt(0.0);
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(gt.matches_all(&list));

        let mixed = Value::List(vec![Value::Int(1), Value::Int(-2)]);
        assert!(!gt.matches_all(&mixed));

        // absent values pass vacuously
        assert!(gt.matches_all(&Value::Null));
    }
}
