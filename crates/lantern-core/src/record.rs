//! Configuration records
//!
//! Plain, serde-decoded records delivered by the external reconciliation
//! collaborator. Construction turns a record into a core entity, returning
//! typed errors for the collaborator to surface as status; it never panics
//! the core.

use crate::error::ConfigError;
use crate::mapping::{check_template, is_template, Mapping};
use crate::matcher::Matcher;
use crate::name::Name;
use crate::profile::{Deliverable, Profile};
use crate::selector::Selector;
use crate::source::{
    binary_source, object_source, url_source, Cache, DataSource, ObjectStore, RedirectSource,
    Source, ValuesSource,
};
use crate::value::{Value, Values};
use crate::document::Document;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "default";

fn entity_name(namespace: Option<&str>, name: &str) -> Result<Name, ConfigError> {
    let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
    if name.trim().is_empty()
        || name.contains('/')
        || namespace.trim().is_empty()
        || namespace.contains('/')
    {
        return Err(ConfigError::InvalidName(format!("{}/{}", namespace, name)));
    }
    Ok(Name::new(namespace, name))
}

fn compile_mapping(tag: &str, mapping: &Option<Value>) -> Result<Option<Mapping>, ConfigError> {
    match mapping {
        Some(tree) => Ok(Some(Mapping::compile(tag, tree.clone())?)),
        None => Ok(None),
    }
}

/// Label-selector record form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSpec {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<RequirementSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSpec {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Matcher record: selector + weight + mapping + profile reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub selector: Option<SelectorSpec>,
    #[serde(default)]
    pub weight: Option<i32>,
    pub profile: String,
    #[serde(default)]
    pub mapping: Option<Value>,
    #[serde(default)]
    pub values: Option<Values>,
}

impl MatcherRecord {
    pub fn build(&self) -> Result<Matcher, ConfigError> {
        let name = entity_name(self.namespace.as_deref(), &self.name)?;
        if self.profile.trim().is_empty() {
            return Err(ConfigError::MissingProfile);
        }

        let selector = match &self.selector {
            Some(spec) => {
                let expressions: Vec<(String, String, Vec<String>)> = spec
                    .match_expressions
                    .iter()
                    .map(|r| (r.key.clone(), r.operator.clone(), r.values.clone()))
                    .collect();
                Selector::compile(&spec.match_labels, &expressions)?
            }
            None => Selector::everything(),
        };
        // Explicit weight, or the selector's specificity.
        let weight = self
            .weight
            .unwrap_or_else(|| selector.specificity() as i32);

        let mapping = compile_mapping(&format!("matcher {}(mapping)", name), &self.mapping)?;
        let profile = Name::new(name.namespace(), self.profile.clone());
        Ok(Matcher::new(
            name,
            selector,
            mapping,
            self.values.clone(),
            profile,
            weight,
        ))
    }
}

/// One path-to-document binding in a profile record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedResourceSpec {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub pattern: String,
    pub document_name: String,
}

/// Profile record: path bindings + mapping + values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resources: Vec<ServedResourceSpec>,
    #[serde(default)]
    pub mapping: Option<Value>,
    #[serde(default)]
    pub values: Option<Values>,
}

impl ProfileRecord {
    pub fn build(&self) -> Result<Profile, ConfigError> {
        let name = entity_name(self.namespace.as_deref(), &self.name)?;

        let mut deliverables = Vec::with_capacity(self.resources.len());
        for (index, r) in self.resources.iter().enumerate() {
            if r.document_name.trim().is_empty() {
                return Err(ConfigError::EmptyDocumentName { index });
            }
            let document = Name::new(name.namespace(), r.document_name.clone());
            let d = match (!r.path.is_empty(), !r.pattern.is_empty()) {
                (true, true) => return Err(ConfigError::PathAndPattern { index }),
                (false, false) => {
                    return Err(ConfigError::MissingPathOrPattern { index })
                }
                (true, false) => Deliverable::new(document, r.path.clone()),
                (false, true) => Deliverable::by_pattern(document, &r.pattern)
                    .map_err(|reason| ConfigError::InvalidPattern { index, reason })?,
            };
            deliverables.push(d);
        }

        let mapping = compile_mapping(&format!("profile {}(mapping)", name), &self.mapping)?;
        Profile::new(name, mapping, self.values.clone(), deliverables)
    }
}

/// Collaborators and limits needed to construct document sources.
#[derive(Clone, Default)]
pub struct SourceContext {
    pub cache: Option<Arc<dyn Cache>>,
    pub objects: Option<Arc<dyn ObjectStore>>,
    pub fetch_timeout: Option<Duration>,
}

impl SourceContext {
    fn timeout(&self) -> Duration {
        self.fetch_timeout.unwrap_or(Duration::from_secs(30))
    }
}

/// Document record: MIME type + source descriptor + mapping + values.
///
/// Exactly one of `text`, `binary`, `url` or `object` selects the source
/// kind; none of them means the document renders the merged values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub redirect: bool,
    /// Bypass the cache for this document's remote fetches.
    #[serde(default)]
    pub volatile: bool,
    /// Bypass templating and merge entirely.
    #[serde(default)]
    pub plain: bool,
    #[serde(default)]
    pub mapping: Option<Value>,
    #[serde(default)]
    pub values: Option<Values>,
}

impl DocumentRecord {
    fn validate_kind(&self) -> Result<(), ConfigError> {
        let mut found = Vec::new();
        if self.text.is_some() {
            found.push("text".to_string());
        }
        if self.binary.is_some() {
            found.push("binary".to_string());
        }
        if self.url.is_some() {
            found.push("url".to_string());
        }
        if self.object.is_some() {
            found.push("object".to_string());
        }
        if found.len() > 1 {
            return Err(ConfigError::AmbiguousSource(found));
        }
        if self.field.is_some() && self.object.is_none() && !found.is_empty() {
            return Err(ConfigError::FieldWithoutObject);
        }
        Ok(())
    }

    fn build_source(&self, name: &Name, ctx: &SourceContext) -> Result<Arc<dyn Source>, ConfigError> {
        let mime = self.mime_type.trim().to_string();

        if let Some(text) = &self.text {
            if is_template(text) {
                check_template(text).map_err(ConfigError::InvalidTemplate)?;
            }
            return Ok(Arc::new(DataSource::text(mime, text.clone())));
        }
        if let Some(binary) = &self.binary {
            return Ok(Arc::new(binary_source(mime, binary)?));
        }
        if let Some(url) = &self.url {
            let cache = if self.volatile {
                None
            } else {
                ctx.cache.clone()
            };
            let source = url_source(mime, url, cache, ctx.timeout())?;
            if self.redirect {
                return Ok(Arc::new(RedirectSource::new(source)));
            }
            return Ok(source);
        }
        if let Some(object) = &self.object {
            let store = ctx.objects.clone().ok_or(ConfigError::NoObjectStore)?;
            return object_source(mime, store, name.namespace(), object, self.field.clone());
        }
        Ok(Arc::new(ValuesSource::new(mime, self.field.clone())))
    }

    pub fn build(&self, ctx: &SourceContext) -> Result<Document, ConfigError> {
        let name = entity_name(self.namespace.as_deref(), &self.name)?;
        if self.mime_type.trim().is_empty() {
            return Err(ConfigError::EmptyMimeType);
        }
        self.validate_kind()?;

        let source = self.build_source(&name, ctx)?;
        let mapping = compile_mapping(&format!("document {}(mapping)", name), &self.mapping)?;
        Ok(Document::new(
            name,
            mapping,
            self.values.clone(),
            source,
            self.plain,
        ))
    }
}
