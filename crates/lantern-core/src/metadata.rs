//! Request metadata and the enrichment chain
//!
//! Raw metadata is derived from query parameters; registered enrichers then
//! refine it (canonicalize identifiers, look up machine records, derive
//! labels). Enrichers run in registration order; the first error aborts the
//! chain and the request.

use crate::error::EnrichError;
use crate::selector::Labels;
use crate::value::{Value, Values};
use axum::http::request::Parts;
use std::sync::{Arc, RwLock};

/// Request metadata: a value tree whose string entries double as the label
/// set for matcher selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaData(Values);

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Values) -> Self {
        Self(values)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn values(&self) -> &Values {
        &self.0
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.0
    }

    pub fn into_values(self) -> Values {
        self.0
    }
}

impl Labels for MetaData {
    fn has(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::String(_)))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// A pluggable metadata enricher.
pub trait MetaDataMapper: Send + Sync {
    fn map(&self, metadata: MetaData, request: &Parts) -> Result<MetaData, EnrichError>;
}

/// Ordered chain of enrichers.
///
/// Explicitly constructed and handed to the handler at startup; there is no
/// ambient process-wide instance. Evaluation order is registration order.
#[derive(Default)]
pub struct Registry {
    chain: RwLock<Vec<Arc<dyn MetaDataMapper>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mapper: Arc<dyn MetaDataMapper>) {
        self.chain
            .write()
            .expect("metadata registry lock poisoned")
            .push(mapper);
    }

    pub fn len(&self) -> usize {
        self.chain
            .read()
            .expect("metadata registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetaDataMapper for Registry {
    fn map(&self, metadata: MetaData, request: &Parts) -> Result<MetaData, EnrichError> {
        let chain = self
            .chain
            .read()
            .expect("metadata registry lock poisoned")
            .clone();
        let mut metadata = metadata;
        for mapper in &chain {
            metadata = mapper.map(metadata, request)?;
        }
        Ok(metadata)
    }
}
