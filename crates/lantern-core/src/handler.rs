//! The boot request pipeline
//!
//! For each request: derive raw metadata from the query parameters, run the
//! enrichment chain, select matchers by label match in priority order, and
//! for the best match resolve profile -> deliverable -> document, run the
//! three mapping layers, render, and serve. The first match that yields a
//! servable deliverable terminates the search.

use crate::catalog::Catalog;
use crate::intermediate::{Intermediate, METADATA_KEY};
use crate::mapping::map_layer;
use crate::metadata::{MetaData, MetaDataMapper, Registry};
use crate::process::process;
use crate::source::error_response;
use crate::value::{Value, Values};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Metadata key carrying the request path below the base path.
pub const RESOURCE_PATH_KEY: &str = "RESOURCE_PATH";

pub struct Handler {
    base_path: String,
    catalog: Arc<Catalog>,
    registry: Arc<Registry>,
}

impl Handler {
    /// `base_path` is normalized to have leading and trailing slashes.
    pub fn new(base_path: &str, catalog: Arc<Catalog>, registry: Arc<Registry>) -> Self {
        let mut base_path = base_path.to_string();
        if !base_path.starts_with('/') {
            base_path.insert(0, '/');
        }
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Self {
            base_path,
            catalog,
            registry,
        }
    }

    fn fail(&self, status: StatusCode, msg: String) -> Response {
        info!(status = %status, "{}", msg);
        error_response(status, msg)
    }

    pub async fn serve(&self, request: Request) -> Response {
        let (parts, _body) = request.into_parts();

        let path = parts.uri.path();
        if !path.starts_with(&self.base_path) {
            return self.fail(StatusCode::NOT_FOUND, "invalid resource".to_string());
        }
        let resource_path = path[self.base_path.len()..].to_string();

        let mut metadata = MetaData::new();
        metadata.insert(RESOURCE_PATH_KEY, Value::from(resource_path.as_str()));
        let mut all_values: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        if let Some(query) = parts.uri.query() {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                // First value under the plain key, every value under the
                // reserved list key.
                if !metadata.contains_key(&k) {
                    metadata.insert(k.to_string(), Value::from(v.as_ref()));
                }
                all_values
                    .entry(k.to_string())
                    .or_default()
                    .push(Value::from(v.as_ref()));
            }
        }
        for (k, list) in all_values {
            metadata.insert(format!("__{}__", k), Value::List(list));
        }
        debug!(path = %resource_path, metadata = ?metadata.values(), "request");

        let metadata = match self.registry.map(metadata, &parts) {
            Ok(metadata) => metadata,
            Err(e) => {
                return self.fail(
                    StatusCode::BAD_REQUEST,
                    format!("cannot map metadata: {}", e),
                )
            }
        };

        let matching = self.catalog.matchers().matching(&metadata);
        if matching.is_empty() {
            return self.fail(StatusCode::NOT_FOUND, "no matching matcher".to_string());
        }
        debug!(count = matching.len(), "matchers found");

        let metadata_values = metadata.into_values();
        let mut wrapper = Values::new();
        wrapper.insert(
            METADATA_KEY.to_string(),
            Value::Map(metadata_values.clone()),
        );

        for matcher in matching {
            let profile_name = matcher.profile_name();
            debug!(matcher = %matcher.name(), profile = %profile_name, "resolving");

            let Some(profile) = self.catalog.profiles().get(profile_name) else {
                return self.fail(
                    StatusCode::NOT_FOUND,
                    format!("profile {:?} not found", profile_name.to_string()),
                );
            };

            let Some(deliverable) = profile.deliverable_for_path(&resource_path) else {
                continue;
            };

            let Some(document) = self.catalog.documents().get(deliverable.document()) else {
                return self.fail(
                    StatusCode::NOT_FOUND,
                    format!(
                        "document {:?} for profile {:?} resource {:?} not found",
                        deliverable.document().to_string(),
                        profile_name.to_string(),
                        resource_path
                    ),
                );
            };
            debug!(document = %document.name(), profile = %profile_name, "document found");

            let mut source = document.source();
            if !document.plain() {
                // Three layers in fixed order, each seeing the same
                // metadata snapshot and the accumulated intermediate.
                let mut intermediate = Intermediate::from_values(wrapper.clone());
                let layers: [(String, Option<&crate::mapping::Mapping>, Option<&Values>); 3] = [
                    (
                        format!("matcher {}", matcher.name()),
                        matcher.mapping(),
                        matcher.values(),
                    ),
                    (
                        format!("profile {}", profile_name),
                        profile.mapping(),
                        profile.values(),
                    ),
                    (
                        format!("profile {}, document {}", profile_name, document.name()),
                        document.mapping(),
                        document.values(),
                    ),
                ];
                for (tag, mapping, values) in layers {
                    intermediate =
                        match map_layer(&tag, mapping, values, &metadata_values, intermediate) {
                            Ok(i) => i,
                            Err(e) => {
                                return self
                                    .fail(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                            }
                        };
                }

                let merged = intermediate.into_values();
                source = match process("document", &merged, source).await {
                    Ok(s) => s,
                    Err(e) => return self.fail(e.status(), e.to_string()),
                };
            }

            return source.serve(&parts).await;
        }

        self.fail(
            StatusCode::NOT_FOUND,
            format!("no resource {:?} found in matches", resource_path),
        )
    }
}
