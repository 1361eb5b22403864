//! Scalar values for document predicates
//!
//! Equality predicates compare a top-level document field against one of
//! these. Arrays and objects are never scalars.

use serde::{Deserialize, Serialize};

/// JSON scalar value used by equality predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsonScalar {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (stored as f64)
    Number(f64),
    /// String value
    String(String),
}

impl JsonScalar {
    /// Check if this scalar matches a JSON value
    pub fn matches_json(&self, value: &serde_json::Value) -> bool {
        match (self, value) {
            (JsonScalar::Null, serde_json::Value::Null) => true,
            (JsonScalar::Bool(a), serde_json::Value::Bool(b)) => a == b,
            (JsonScalar::Number(a), serde_json::Value::Number(b)) => {
                b.as_f64().is_some_and(|n| (a - n).abs() < f64::EPSILON)
            }
            (JsonScalar::String(a), serde_json::Value::String(b)) => a == b,
            _ => false,
        }
    }

    /// Scalar view of a JSON value, `None` for arrays and objects
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(JsonScalar::Null),
            serde_json::Value::Bool(b) => Some(JsonScalar::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(JsonScalar::Number),
            serde_json::Value::String(s) => Some(JsonScalar::String(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for JsonScalar {
    fn from(v: bool) -> Self {
        JsonScalar::Bool(v)
    }
}

impl From<i32> for JsonScalar {
    fn from(v: i32) -> Self {
        JsonScalar::Number(v as f64)
    }
}

impl From<i64> for JsonScalar {
    fn from(v: i64) -> Self {
        JsonScalar::Number(v as f64)
    }
}

impl From<u64> for JsonScalar {
    fn from(v: u64) -> Self {
        JsonScalar::Number(v as f64)
    }
}

impl From<f64> for JsonScalar {
    fn from(v: f64) -> Self {
        JsonScalar::Number(v)
    }
}

impl From<String> for JsonScalar {
    fn from(v: String) -> Self {
        JsonScalar::String(v)
    }
}

impl From<&str> for JsonScalar {
    fn from(v: &str) -> Self {
        JsonScalar::String(v.to_string())
    }
}
