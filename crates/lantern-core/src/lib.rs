//! Lantern core
//!
//! Resolves an inbound network-boot request into a rendered boot artifact:
//! weighted label-selector matching, a three-tier Matcher -> Profile ->
//! Document dependency graph with cascading invalidation, a layered
//! value-merge/templating engine, a pluggable metadata-enrichment chain,
//! polymorphic content sources, and the request pipeline tying it together.
//!
//! The watch/reconcile machinery that discovers configuration, status
//! reporting, TLS and the concrete cache implementation live outside this
//! crate; they drive it through [`Catalog`], [`record`] and the [`Cache`]
//! and [`ObjectStore`] contracts.

pub mod catalog;
pub mod document;
pub mod element;
pub mod error;
pub mod handler;
pub mod intermediate;
pub mod mapping;
pub mod matcher;
pub mod metadata;
pub mod name;
pub mod process;
pub mod profile;
pub mod record;
pub mod selector;
pub mod source;
pub mod value;

pub use catalog::{Catalog, Propagation};
pub use document::{Document, Documents};
pub use element::Element;
pub use error::{ConfigError, EnrichError, MappingError, SourceError};
pub use handler::{Handler, RESOURCE_PATH_KEY};
pub use intermediate::{Intermediate, CURRENT_KEY, METADATA_KEY};
pub use mapping::{map_layer, Mapping, OUTPUT_KEY};
pub use matcher::{Matcher, Matchers};
pub use metadata::{MetaData, MetaDataMapper, Registry};
pub use name::{Name, NameSet};
pub use process::process;
pub use profile::{Deliverable, Profile, Profiles};
pub use record::{
    DocumentRecord, MatcherRecord, ProfileRecord, SelectorSpec, SourceContext,
    DEFAULT_NAMESPACE,
};
pub use selector::{Labels, Selector};
pub use source::{
    binary_source, object_source, url_source, Cache, DataSource, MappedObjectSource,
    MappedUrlSource, ObjectSource, ObjectStore, RedirectSource, RequestMappable, Source,
    UrlBacked, UrlSource, ValuesSource, MIME_JSON, MIME_OCTET, MIME_TEXT, MIME_YAML,
};
pub use value::{Value, Values};
