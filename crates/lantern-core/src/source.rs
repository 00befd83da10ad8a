//! Content sources
//!
//! A document is backed by a [`Source`]: static bytes, a remote URL
//! (optionally cache-backed), a redirect, a field of an external object, or
//! the merged request values themselves. Sources whose descriptor carries a
//! substitution marker are *request-parameterized*: they cannot be served
//! directly and must first be mapped against the merged values, yielding a
//! concrete source of the same kind.
//!
//! Capabilities are explicit: the base [`Source`] contract plus the optional
//! [`RequestMappable`] and [`UrlBacked`] capabilities, discovered through
//! capability queries instead of concrete-type checks.

use crate::error::{ConfigError, SourceError};
use crate::mapping::{check_template, is_template, render_template};
use crate::name::Name;
use crate::value::{Value, Values};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, request::Parts, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const MIME_OCTET: &str = "application/octet-stream";
pub const MIME_JSON: &str = "application/json";
pub const MIME_YAML: &str = "application/x-yaml";
pub const MIME_YAML_ALT: &str = "application/yaml";
pub const MIME_TEXT: &str = "text/plain";

const TEXT_FAMILY_PREFIX: &str = "text/";

pub fn is_json_mime(mime: &str) -> bool {
    mime == MIME_JSON
}

pub fn is_yaml_mime(mime: &str) -> bool {
    mime == MIME_YAML || mime == MIME_YAML_ALT
}

pub fn is_text_mime(mime: &str) -> bool {
    mime.starts_with(TEXT_FAMILY_PREFIX)
}

/// Base content-source contract.
#[async_trait]
pub trait Source: Send + Sync {
    /// MIME type written as `Content-Type` when non-empty.
    fn mime_type(&self) -> &str;

    /// Literal content, if any. `Ok(None)` means the source carries no
    /// literal bytes (structured rendering serializes the merged values
    /// instead); an error means bytes are not applicable at all.
    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError>;

    /// Serve directly: stream content or redirect.
    async fn serve(&self, request: &Parts) -> Response;

    /// Capability query: can this source be specialized per request?
    fn as_mappable(&self) -> Option<&dyn RequestMappable> {
        None
    }

    /// Capability query: is this source backed by a URL?
    fn as_url_backed(&self) -> Option<&dyn UrlBacked> {
        None
    }
}

impl std::fmt::Debug for dyn Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("mime_type", &self.mime_type())
            .finish_non_exhaustive()
    }
}

/// Capability of request-parameterized sources: resolve against merged
/// values into a concrete, servable source of the same kind.
pub trait RequestMappable: Send + Sync {
    fn map(&self, values: &Values) -> Result<Arc<dyn Source>, SourceError>;
}

/// Capability of URL-backed sources.
pub trait UrlBacked: Send + Sync {
    fn url(&self) -> String;
    fn cache(&self) -> Option<Arc<dyn Cache>>;
}

/// Remote-content cache collaborator contract.
///
/// Implementations own their freshness and content-type policy; `cleanup`
/// is driven by an external periodic schedule.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn bytes(&self, url: &Url) -> Result<Vec<u8>, SourceError>;
    async fn serve(&self, url: &Url, request: &Parts) -> Response;
    /// Evict entries older than `ttl`; returns the number evicted.
    async fn cleanup(&self, ttl: Duration) -> Result<usize, SourceError>;
}

/// External object collaborator contract for object-field sources.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object as a key/value bag; `Ok(None)` if it does not exist.
    async fn get(&self, name: &Name) -> Result<Option<Values>, SourceError>;
}

impl SourceError {
    /// HTTP status this failure maps onto.
    pub fn status(&self) -> StatusCode {
        match self {
            SourceError::UnresolvedTemplate
            | SourceError::Render(_)
            | SourceError::MappedUrl { .. }
            | SourceError::Serialize(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SourceError::ObjectNotFound(_) | SourceError::FieldNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            SourceError::Fetch { .. } | SourceError::Cache(_) | SourceError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// 200 response with the source's content type, when one is set.
pub fn content_response(mime: &str, data: Vec<u8>) -> Response {
    let mut resp = Response::new(Body::from(data));
    if !mime.is_empty() {
        if let Ok(value) = HeaderValue::from_str(mime) {
            resp.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    resp
}

/// Plain-text error body, newline-terminated.
pub fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, msg.into() + "\n").into_response()
}

fn redirect_response(url: &str) -> Response {
    match HeaderValue::from_str(url) {
        Ok(value) => {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::MOVED_PERMANENTLY;
            resp.headers_mut().insert(header::LOCATION, value);
            resp
        }
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid redirect target {:?}", url),
        ),
    }
}

////////////////////////////////////////////////////////////////////////////
// Static data

/// Fixed bytes with a fixed MIME type.
#[derive(Debug, Clone)]
pub struct DataSource {
    mime: String,
    data: Vec<u8>,
}

impl DataSource {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn text(mime: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(mime, text.into().into_bytes())
    }
}

#[async_trait]
impl Source for DataSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(Some(self.data.clone()))
    }

    async fn serve(&self, _request: &Parts) -> Response {
        content_response(&self.mime, self.data.clone())
    }
}

/// Decode a base64 record payload into a static source.
pub fn binary_source(mime: impl Into<String>, b64: &str) -> Result<DataSource, ConfigError> {
    let data = BASE64
        .decode(b64.trim())
        .map_err(|e| ConfigError::InvalidBinary(e.to_string()))?;
    Ok(DataSource::new(mime, data))
}

////////////////////////////////////////////////////////////////////////////
// Merged-values source

/// Source without literal bytes: rendering serializes the merged values,
/// or a single named field of them.
#[derive(Debug, Clone)]
pub struct ValuesSource {
    mime: String,
    field: Option<String>,
}

impl ValuesSource {
    pub fn new(mime: impl Into<String>, field: Option<String>) -> Self {
        Self {
            mime: mime.into(),
            field,
        }
    }
}

#[async_trait]
impl Source for ValuesSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(None)
    }

    async fn serve(&self, _request: &Parts) -> Response {
        // Only meaningful after rendering against merged values.
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "document has no literal content",
        )
    }

    fn as_mappable(&self) -> Option<&dyn RequestMappable> {
        Some(self)
    }
}

impl RequestMappable for ValuesSource {
    fn map(&self, values: &Values) -> Result<Arc<dyn Source>, SourceError> {
        let selected = match &self.field {
            Some(field) => values.get(field).cloned().unwrap_or(Value::Null),
            None => Value::Map(values.clone()),
        };
        let data = serialize_value(&self.mime, &selected)?;
        Ok(Arc::new(DataSource::new(self.mime.clone(), data)))
    }
}

fn serialize_value(mime: &str, value: &Value) -> Result<Vec<u8>, SourceError> {
    if is_yaml_mime(mime) {
        return serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| SourceError::Serialize(e.to_string()));
    }
    if is_text_mime(mime) {
        return match value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Err(SourceError::Serialize(format!(
                "text content must be a string, got {:?}",
                other
            ))),
        };
    }
    serde_json::to_vec(value).map_err(|e| SourceError::Serialize(e.to_string()))
}

////////////////////////////////////////////////////////////////////////////
// Remote URLs

/// Concrete remote source; fetches go through the cache when one is
/// attached, otherwise directly, bounded by the configured deadline.
pub struct UrlSource {
    mime: String,
    url: Url,
    cache: Option<Arc<dyn Cache>>,
    client: reqwest::Client,
}

impl UrlSource {
    pub fn new(
        mime: impl Into<String>,
        url: Url,
        cache: Option<Arc<dyn Cache>>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = http_client(timeout)?;
        Ok(Self::from_parts(mime, url, cache, client))
    }

    fn from_parts(
        mime: impl Into<String>,
        url: Url,
        cache: Option<Arc<dyn Cache>>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            mime: mime.into(),
            url,
            cache,
            client,
        }
    }

    async fn fetch(&self) -> Result<reqwest::Response, SourceError> {
        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Fetch {
                url: self.url.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(SourceError::Fetch {
                url: self.url.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }
        Ok(resp)
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

#[async_trait]
impl Source for UrlSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        if let Some(cache) = &self.cache {
            return cache.bytes(&self.url).await.map(Some);
        }
        let resp = self.fetch().await?;
        let data = resp.bytes().await.map_err(|e| SourceError::Fetch {
            url: self.url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(data.to_vec()))
    }

    async fn serve(&self, request: &Parts) -> Response {
        if let Some(cache) = &self.cache {
            return cache.serve(&self.url, request).await;
        }
        let resp = match self.fetch().await {
            Ok(resp) => resp,
            Err(e) => return error_response(e.status(), e.to_string()),
        };
        // The origin's content type wins over the configured one when
        // serving directly.
        let mime = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.mime.clone());
        match resp.bytes().await {
            Ok(data) => content_response(&mime, data.to_vec()),
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("fetch of {} failed: {}", self.url, e),
            ),
        }
    }

    fn as_url_backed(&self) -> Option<&dyn UrlBacked> {
        Some(self)
    }
}

impl UrlBacked for UrlSource {
    fn url(&self) -> String {
        self.url.to_string()
    }

    fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.cache.clone()
    }
}

/// Request-parameterized remote source: the URL is a template. Not servable
/// until mapped.
pub struct MappedUrlSource {
    mime: String,
    raw: String,
    cache: Option<Arc<dyn Cache>>,
    client: reqwest::Client,
}

impl MappedUrlSource {
    pub fn new(
        mime: impl Into<String>,
        raw: impl Into<String>,
        cache: Option<Arc<dyn Cache>>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let raw = raw.into();
        check_template(&raw).map_err(ConfigError::InvalidTemplate)?;
        Ok(Self {
            mime: mime.into(),
            raw,
            cache,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Source for MappedUrlSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        Err(SourceError::UnresolvedTemplate)
    }

    async fn serve(&self, _request: &Parts) -> Response {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            SourceError::UnresolvedTemplate.to_string(),
        )
    }

    fn as_mappable(&self) -> Option<&dyn RequestMappable> {
        Some(self)
    }

    fn as_url_backed(&self) -> Option<&dyn UrlBacked> {
        Some(self)
    }
}

impl RequestMappable for MappedUrlSource {
    fn map(&self, values: &Values) -> Result<Arc<dyn Source>, SourceError> {
        let rendered = render_template(&self.raw, values).map_err(SourceError::Render)?;
        let url = Url::parse(&rendered).map_err(|e| SourceError::MappedUrl {
            value: rendered.clone(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(UrlSource::from_parts(
            self.mime.clone(),
            url,
            self.cache.clone(),
            self.client.clone(),
        )))
    }
}

impl UrlBacked for MappedUrlSource {
    fn url(&self) -> String {
        self.raw.clone()
    }

    fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.cache.clone()
    }
}

/// Build the right URL source for a raw descriptor: templated descriptors
/// become request-parameterized, anything else is parsed now.
pub fn url_source(
    mime: impl Into<String>,
    raw: &str,
    cache: Option<Arc<dyn Cache>>,
    timeout: Duration,
) -> Result<Arc<dyn Source>, ConfigError> {
    if is_template(raw) {
        return Ok(Arc::new(MappedUrlSource::new(mime, raw, cache, timeout)?));
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(UrlSource::new(mime, url, cache, timeout)?))
}

////////////////////////////////////////////////////////////////////////////
// Redirects

/// Redirects to the resolved URL of the wrapped source instead of serving
/// its content.
#[derive(Clone)]
pub struct RedirectSource {
    inner: Arc<dyn Source>,
}

impl RedirectSource {
    pub fn new(inner: Arc<dyn Source>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Source for RedirectSource {
    fn mime_type(&self) -> &str {
        self.inner.mime_type()
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        self.inner.bytes().await
    }

    async fn serve(&self, _request: &Parts) -> Response {
        match self.inner.as_url_backed() {
            Some(url) if self.inner.as_mappable().is_none() => redirect_response(&url.url()),
            _ => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                SourceError::UnresolvedTemplate.to_string(),
            ),
        }
    }

    fn as_mappable(&self) -> Option<&dyn RequestMappable> {
        if self.inner.as_mappable().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_url_backed(&self) -> Option<&dyn UrlBacked> {
        self.inner.as_url_backed()
    }
}

impl RequestMappable for RedirectSource {
    fn map(&self, values: &Values) -> Result<Arc<dyn Source>, SourceError> {
        match self.inner.as_mappable() {
            Some(mappable) => Ok(Arc::new(RedirectSource::new(mappable.map(values)?))),
            None => Ok(Arc::new(self.clone())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// Object fields

/// Resolves a field out of a referenced external object at serve time.
/// A missing object or field is a not-found failure, never a default.
#[derive(Clone)]
pub struct ObjectSource {
    mime: String,
    store: Arc<dyn ObjectStore>,
    name: Name,
    field: Option<String>,
}

impl ObjectSource {
    pub fn new(
        mime: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        name: Name,
        field: Option<String>,
    ) -> Self {
        Self {
            mime: mime.into(),
            store,
            name,
            field,
        }
    }
}

#[async_trait]
impl Source for ObjectSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        let bag = self
            .store
            .get(&self.name)
            .await?
            .ok_or_else(|| SourceError::ObjectNotFound(self.name.clone()))?;
        let data = match &self.field {
            Some(field) => match bag.get(field) {
                None => {
                    return Err(SourceError::FieldNotFound {
                        name: self.name.clone(),
                        field: field.clone(),
                    })
                }
                Some(Value::String(s)) => s.clone().into_bytes(),
                Some(other) => serialize_value(&self.mime, other)?,
            },
            None => serialize_value(&self.mime, &Value::Map(bag))?,
        };
        Ok(Some(data))
    }

    async fn serve(&self, _request: &Parts) -> Response {
        match self.bytes().await {
            Ok(Some(data)) => content_response(&self.mime, data),
            Ok(None) => content_response(&self.mime, Vec::new()),
            Err(e) => error_response(e.status(), e.to_string()),
        }
    }
}

/// Request-parameterized object source: object name and/or field are
/// templates rendered against the merged values.
#[derive(Clone)]
pub struct MappedObjectSource {
    mime: String,
    store: Arc<dyn ObjectStore>,
    namespace: String,
    raw_name: String,
    raw_field: Option<String>,
}

impl MappedObjectSource {
    pub fn new(
        mime: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        namespace: impl Into<String>,
        raw_name: impl Into<String>,
        raw_field: Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw_name = raw_name.into();
        if is_template(&raw_name) {
            check_template(&raw_name).map_err(ConfigError::InvalidTemplate)?;
        }
        if let Some(field) = &raw_field {
            if is_template(field) {
                check_template(field).map_err(ConfigError::InvalidTemplate)?;
            }
        }
        Ok(Self {
            mime: mime.into(),
            store,
            namespace: namespace.into(),
            raw_name,
            raw_field,
        })
    }
}

#[async_trait]
impl Source for MappedObjectSource {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn bytes(&self) -> Result<Option<Vec<u8>>, SourceError> {
        Err(SourceError::UnresolvedTemplate)
    }

    async fn serve(&self, _request: &Parts) -> Response {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            SourceError::UnresolvedTemplate.to_string(),
        )
    }

    fn as_mappable(&self) -> Option<&dyn RequestMappable> {
        Some(self)
    }
}

impl RequestMappable for MappedObjectSource {
    fn map(&self, values: &Values) -> Result<Arc<dyn Source>, SourceError> {
        let name = if is_template(&self.raw_name) {
            render_template(&self.raw_name, values).map_err(SourceError::Render)?
        } else {
            self.raw_name.clone()
        };
        let field = match &self.raw_field {
            Some(f) if is_template(f) => {
                Some(render_template(f, values).map_err(SourceError::Render)?)
            }
            other => other.clone(),
        };
        Ok(Arc::new(ObjectSource::new(
            self.mime.clone(),
            self.store.clone(),
            Name::new(self.namespace.clone(), name),
            field,
        )))
    }
}

/// Build the right object source for a descriptor: templated name or field
/// become request-parameterized, anything else is concrete.
pub fn object_source(
    mime: impl Into<String>,
    store: Arc<dyn ObjectStore>,
    namespace: impl Into<String>,
    name: impl Into<String>,
    field: Option<String>,
) -> Result<Arc<dyn Source>, ConfigError> {
    let name = name.into();
    let namespace = namespace.into();
    let templated =
        is_template(&name) || field.as_deref().map(is_template).unwrap_or(false);
    if templated {
        return Ok(Arc::new(MappedObjectSource::new(
            mime, store, namespace, name, field,
        )?));
    }
    Ok(Arc::new(ObjectSource::new(
        mime,
        store,
        Name::new(namespace, name),
        field,
    )))
}
