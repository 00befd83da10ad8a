//! Error types for the boot-resolution core
//!
//! Three families, mirroring their lifecycles: [`ConfigError`] is produced
//! while constructing entities from configuration records and becomes the
//! entity's persistent status; [`MappingError`] and [`SourceError`] occur
//! per request and map onto an HTTP status in the handler.

use crate::name::Name;
use thiserror::Error;

/// Configuration-time error, surfaced as entity status, never a panic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid name {0:?}: must be non-empty and must not contain '/'")]
    InvalidName(String),

    #[error("mime type empty")]
    EmptyMimeType,

    #[error("no profile specified")]
    MissingProfile,

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("entry {index}: empty document name")]
    EmptyDocumentName { index: usize },

    #[error("entry {index}: empty path")]
    EmptyPath { index: usize },

    #[error("entry {index}: path and pattern given")]
    PathAndPattern { index: usize },

    #[error("entry {index}: path or pattern missing")]
    MissingPathOrPattern { index: usize },

    #[error("entry {index}: invalid path pattern: {reason}")]
    InvalidPattern { index: usize, reason: String },

    #[error("duplicate deliverable for path {path} ({old} and {new})")]
    DuplicatePath { path: String, old: Name, new: Name },

    #[error("only one of [{}] can be used", .0.join(", "))]
    AmbiguousSource(Vec<String>),

    #[error("text is no valid template: {0}")]
    InvalidTemplate(String),

    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("invalid binary data: {0}")]
    InvalidBinary(String),

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no object store configured for object source")]
    NoObjectStore,

    #[error("field can only be used together with an object source, or alone")]
    FieldWithoutObject,

    #[error("http client setup failed: {0}")]
    Client(String),
}

/// Mapping-layer evaluation failure, tagged with the failing layer.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{tag}: {reason}")]
    Eval { tag: String, reason: String },

    #[error("unexpected type for mapping {field}")]
    BadField { field: String },
}

/// Serve-time content failure.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot serve unresolved template")]
    UnresolvedTemplate,

    #[error("object {0} not found")]
    ObjectNotFound(Name),

    #[error("no field {field} found in object {name}")]
    FieldNotFound { name: Name, field: String },

    #[error("fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("mapping result {value:?} is no valid URL: {reason}")]
    MappedUrl { value: String, reason: String },

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("cache failure: {0}")]
    Cache(String),

    #[error("object store failure: {0}")]
    Store(String),
}

/// Metadata-enrichment failure; aborts the chain and the request.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EnrichError(pub String);
