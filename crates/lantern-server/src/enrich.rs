//! Built-in metadata enrichers
//!
//! Registered into the enrichment chain at startup. Boot firmware is
//! inconsistent about identifier formatting, so the canonicalizers below
//! normalize the common keys before matching happens.

use axum::http::request::Parts;
use lantern_core::{EnrichError, MetaData, MetaDataMapper, Value};

/// Lower-cases MAC addresses and converts `-` separators to `:`.
pub struct MacCanonicalizer {
    key: String,
}

impl MacCanonicalizer {
    pub fn new() -> Self {
        Self {
            key: "mac".to_string(),
        }
    }

    pub fn for_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for MacCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaDataMapper for MacCanonicalizer {
    fn map(&self, mut metadata: MetaData, _request: &Parts) -> Result<MetaData, EnrichError> {
        if let Some(Value::String(mac)) = metadata.values().get(&self.key) {
            let canonical = mac.trim().to_ascii_lowercase().replace('-', ":");
            metadata.insert(self.key.clone(), Value::String(canonical));
        }
        Ok(metadata)
    }
}

/// Lower-cases UUIDs; firmware variously reports them upper- or mixed-case.
pub struct UuidCanonicalizer {
    key: String,
}

impl UuidCanonicalizer {
    pub fn new() -> Self {
        Self {
            key: "uuid".to_string(),
        }
    }
}

impl Default for UuidCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaDataMapper for UuidCanonicalizer {
    fn map(&self, mut metadata: MetaData, _request: &Parts) -> Result<MetaData, EnrichError> {
        if let Some(Value::String(uuid)) = metadata.values().get(&self.key) {
            let canonical = uuid.trim().to_ascii_lowercase();
            metadata.insert(self.key.clone(), Value::String(canonical));
        }
        Ok(metadata)
    }
}
