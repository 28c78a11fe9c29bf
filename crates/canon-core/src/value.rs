//! Claim value tree
//!
//! A closed JSON-like value type. Numbers are `f64` so non-finite values can
//! be represented long enough to be rejected by validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix marking a string value as a reference to another entity
pub const ENTITY_PREFIX: &str = "ENT-";

/// Recursive claim value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<CanonValue>),
    Object(BTreeMap<String, CanonValue>),
}

impl CanonValue {
    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, CanonValue)>,
    {
        CanonValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert any serializable value through its JSON shape
    pub fn from_serializable<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(CanonValue::from)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CanonValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CanonValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Entity id referenced by this value, if it is an `ENT-` string
    pub fn object_entity(&self) -> Option<&str> {
        self.as_str().filter(|s| s.starts_with(ENTITY_PREFIX))
    }

    /// Short type label used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            CanonValue::Null => "null",
            CanonValue::Bool(_) => "bool",
            CanonValue::Number(_) => "number",
            CanonValue::String(_) => "string",
            CanonValue::Array(_) => "array",
            CanonValue::Object(_) => "object",
        }
    }

    /// JSON-path of the first NaN in the tree
    pub fn find_nan(&self) -> Option<String> {
        Self::find_number(self, "$", &|n| n.is_nan())
    }

    /// JSON-path of the first NaN or infinity in the tree
    pub fn find_non_finite(&self) -> Option<String> {
        Self::find_number(self, "$", &|n| !n.is_finite())
    }

    fn find_number(value: &CanonValue, path: &str, pred: &dyn Fn(f64) -> bool) -> Option<String> {
        match value {
            CanonValue::Number(n) if pred(*n) => Some(path.to_string()),
            CanonValue::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| Self::find_number(item, &format!("{}[{}]", path, i), pred)),
            CanonValue::Object(map) => map
                .iter()
                .find_map(|(k, v)| Self::find_number(v, &format!("{}.{}", path, k), pred)),
            _ => None,
        }
    }

    /// Deep, key-order independent equality
    ///
    /// Numbers compare by value, so `NaN` never equals anything.
    pub fn semantic_equals(&self, other: &CanonValue) -> bool {
        match (self, other) {
            (CanonValue::Null, CanonValue::Null) => true,
            (CanonValue::Bool(a), CanonValue::Bool(b)) => a == b,
            (CanonValue::Number(a), CanonValue::Number(b)) => a == b,
            (CanonValue::String(a), CanonValue::String(b)) => a == b,
            (CanonValue::Array(a), CanonValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantic_equals(y))
            }
            (CanonValue::Object(a), CanonValue::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.get(k).map(|w| v.semantic_equals(w)).unwrap_or(false)
                    })
            }
            _ => false,
        }
    }
}

impl From<serde_json::Value> for CanonValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CanonValue::Null,
            serde_json::Value::Bool(b) => CanonValue::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(CanonValue::Number).unwrap_or(CanonValue::Null),
            serde_json::Value::String(s) => CanonValue::String(s),
            serde_json::Value::Array(items) => {
                CanonValue::Array(items.into_iter().map(CanonValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                CanonValue::Object(map.into_iter().map(|(k, v)| (k, CanonValue::from(v))).collect())
            }
        }
    }
}

impl From<bool> for CanonValue {
    fn from(b: bool) -> Self {
        CanonValue::Bool(b)
    }
}

impl From<f64> for CanonValue {
    fn from(n: f64) -> Self {
        CanonValue::Number(n)
    }
}

impl From<i64> for CanonValue {
    fn from(n: i64) -> Self {
        CanonValue::Number(n as f64)
    }
}

impl From<i32> for CanonValue {
    fn from(n: i32) -> Self {
        CanonValue::Number(f64::from(n))
    }
}

impl From<u32> for CanonValue {
    fn from(n: u32) -> Self {
        CanonValue::Number(f64::from(n))
    }
}

impl From<&str> for CanonValue {
    fn from(s: &str) -> Self {
        CanonValue::String(s.to_string())
    }
}

impl From<String> for CanonValue {
    fn from(s: String) -> Self {
        CanonValue::String(s)
    }
}

impl<T: Into<CanonValue>> From<Vec<T>> for CanonValue {
    fn from(items: Vec<T>) -> Self {
        CanonValue::Array(items.into_iter().map(Into::into).collect())
    }
}

/// An absent value normalizes to `Null`
impl<T: Into<CanonValue>> From<Option<T>> for CanonValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CanonValue::Null)
    }
}
