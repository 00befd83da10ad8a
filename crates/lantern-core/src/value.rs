//! Dynamic value trees
//!
//! Configuration values, request metadata and mapping results all flow
//! through the same loosely-typed tree shape. The [`Value`] variant is the
//! single normalized representation; everything entering the core (JSON,
//! YAML, query parameters) is converted here once, so the rest of the code
//! never inspects foreign value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A keyed value tree, the unit of configuration and metadata exchange.
pub type Values = BTreeMap<String, Value>;

/// Normalized dynamic value.
///
/// Integers are widened to `i64`, floats to `f64`. Maps are ordered so that
/// rendering and serialization are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Values),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Values> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Values> for Value {
    fn from(m: Values) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(l) => Value::List(l.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(v: serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(l) => {
                Value::List(l.into_iter().map(Value::from).collect())
            }
            serde_yaml::Value::Mapping(m) => Value::Map(
                m.into_iter()
                    .map(|(k, v)| (yaml_key(k), Value::from(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(t) => Value::from(t.value),
        }
    }
}

fn yaml_key(k: serde_yaml::Value) -> String {
    match k {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Fill keys of `from` into `base` without overwriting.
///
/// Existing keys in `base` win; only gaps are filled. Keys listed in
/// `recurse` descend one level when both sides hold maps, instead of
/// short-circuiting on the existing entry.
pub fn fill_missing(base: &mut Values, from: &Values, recurse: &[&str]) {
    for (k, v) in from {
        match base.get_mut(k) {
            None => {
                base.insert(k.clone(), v.clone());
            }
            Some(existing) if existing.is_null() => {
                *existing = v.clone();
            }
            Some(Value::Map(inner)) if recurse.contains(&k.as_str()) => {
                if let Value::Map(from_inner) = v {
                    fill_missing(inner, from_inner, &[]);
                }
            }
            Some(_) => {}
        }
    }
}
