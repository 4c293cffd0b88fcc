//! Attribute values and transform keyword arguments
//!
//! Every extracted field resolves to a `Value`. Values are what transform
//! pipelines pass between stages, what records carry to sinks, and what
//! condition predicates compare against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically-typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Keyword arguments for one transform pipeline stage
pub type Kwargs = BTreeMap<String, Value>;

impl Value {
    /// Returns true for values that count as "no usable extraction":
    /// null, empty text, empty list/map, and false.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Int(_) | Value::Float(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Renders scalar values as the string used for URL rewriting and
    /// request parameters. Lists and maps have no single rendering.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Iterates the scalar members of this value: a list yields its
    /// elements, anything else yields itself. Nulls are skipped.
    pub fn members(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().filter(|v| !matches!(v, Value::Null)).collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Collapses a single-element list to its element, mirroring the
    /// convention that a selector matching one node yields a scalar.
    pub fn collapse(values: Vec<Value>) -> Value {
        let mut values = values;
        match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::List(values),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

/// Declared attribute type used for soft validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Int,
    Float,
    Bool,
    List,
}

impl ValueType {
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Text, Value::Text(_))
                | (ValueType::Int, Value::Int(_))
                | (ValueType::Float, Value::Float(_))
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::List, Value::List(_))
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(Value::Bool(false).is_empty());

        assert!(!Value::Text("x".into()).is_empty());
        assert!(!Value::Int(0).is_empty());
        assert!(!Value::Bool(true).is_empty());
    }

    #[test]
    fn test_collapse() {
        assert_eq!(Value::collapse(vec![]), Value::Null);
        assert_eq!(
            Value::collapse(vec![Value::Text("a".into())]),
            Value::Text("a".into())
        );
        assert_eq!(
            Value::collapse(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_members_flattens_lists() {
        let list = Value::List(vec![Value::Int(1), Value::Null, Value::Int(2)]);
        assert_eq!(list.members().len(), 2);

        let scalar = Value::Text("a".into());
        assert_eq!(scalar.members(), vec![&scalar]);
        assert!(Value::Null.members().is_empty());
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": ["x", 2.5], "c": null}"#).unwrap();
        let value = Value::from(json);
        match value {
            Value::Map(entries) => {
                assert_eq!(entries["a"], Value::Int(1));
                assert_eq!(
                    entries["b"],
                    Value::List(vec![Value::Text("x".into()), Value::Float(2.5)])
                );
                assert_eq!(entries["c"], Value::Null);
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_value_type_soft_match() {
        assert!(ValueType::Int.matches(&Value::Int(3)));
        assert!(!ValueType::Int.matches(&Value::Text("3".into())));
        assert_eq!(ValueType::parse("float"), Some(ValueType::Float));
        assert_eq!(ValueType::parse("datetime"), None);
    }
}
