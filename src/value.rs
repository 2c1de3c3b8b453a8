//! Tagged property values carried by prepared nodes and edges.
//!
//! Input cells arrive as strings; the row preparer coerces them into this
//! variant according to the declared property type. Typing information lives
//! exclusively in the schema model - a `Value` only knows what it holds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A coerced property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or uncoercible value
    Null,
    /// Boolean property
    Bool(bool),
    /// Integer property
    Int(i64),
    /// Floating point property
    Float(f64),
    /// String property (also carries canonical dates and JSON-encoded arrays)
    String(String),
}

impl Value {
    /// True when the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the inner string, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value` for parameter maps.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::from(s.clone()),
        }
    }

    /// Build a `Value` from a JSON value read back from a graph store.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    /// Canonical text used inside node signatures. Stable across runs: the
    /// same value always renders the same way.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_stable() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::String("Poodle".into()).to_string(), "Poodle");
    }

    #[test]
    fn test_json_roundtrip() {
        let values = vec![
            Value::Null,
            Value::Bool(false),
            Value::Int(42),
            Value::Float(1.25),
            Value::String("S1".into()),
        ];
        for v in values {
            assert_eq!(Value::from_json(&v.to_json()), v);
        }
    }
}
