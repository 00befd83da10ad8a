//! Accumulated mapping state
//!
//! An [`Intermediate`] carries the value tree accumulated across the mapping
//! layers of one request. Layers never mutate it in place; each produces a
//! new one.

use crate::error::MappingError;
use crate::value::{Value, Values};

/// Reserved key under which `wrap` exposes the prior layer's whole state.
pub const CURRENT_KEY: &str = "current";

/// Reserved key carrying the request metadata. Never propagated forward by
/// defaulting merge; the handler re-supplies it fresh on every layer.
pub const METADATA_KEY: &str = "metadata";

/// Accumulated, possibly-absent value tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intermediate(Option<Values>);

impl Intermediate {
    pub fn nil() -> Self {
        Self(None)
    }

    pub fn from_values(values: Values) -> Self {
        Self(Some(values))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    pub fn values(&self) -> Option<&Values> {
        self.0.as_ref()
    }

    /// Flatten; nil becomes the empty map.
    pub fn into_values(self) -> Values {
        self.0.unwrap_or_default()
    }

    pub fn field_value(&self, name: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|v| v.get(name))
    }

    /// Sub-tree access. Present non-map fields are an error; absent or null
    /// fields are `None`.
    pub fn field(&self, name: &str) -> Result<Option<Intermediate>, MappingError> {
        match self.field_value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Map(m)) => Ok(Some(Intermediate::from_values(m.clone()))),
            Some(_) => Err(MappingError::BadField {
                field: name.to_string(),
            }),
        }
    }

    /// Expose the prior state one level down under [`CURRENT_KEY`], keeping
    /// the top-level keys visible as well, so a mapping template can read
    /// both the individual fields and the whole accumulated tree.
    pub fn wrap(&self) -> Intermediate {
        let current = self.0.clone().unwrap_or_default();
        let mut wrapped = current.clone();
        wrapped.insert(CURRENT_KEY.to_string(), Value::Map(current));
        Intermediate::from_values(wrapped)
    }

    /// Defaulting merge: deep copy of `values` as the new base, back-filled
    /// with keys of the current state absent from the base. The reserved
    /// [`METADATA_KEY`] is dropped from the result.
    pub fn merge(&self, values: &Values) -> Intermediate {
        if values.is_empty() {
            return self.clone();
        }
        let Some(current) = self.0.as_ref() else {
            return Intermediate::from_values(values.clone());
        };

        let mut base = values.clone();
        for (k, v) in current {
            let fill = match base.get(k) {
                None => true,
                Some(existing) => existing.is_null(),
            };
            if fill {
                base.insert(k.clone(), v.clone());
            }
        }
        base.remove(METADATA_KEY);
        Intermediate::from_values(base)
    }
}
