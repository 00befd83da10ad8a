//! Manifest loading
//!
//! Stands in for the cluster reconciler: reads a directory of YAML
//! manifests and applies them to the catalog through the same entry points
//! a watch-driven collaborator would use. Documents are applied first, then
//! profiles, then matchers, so forward references resolve within one load.

use anyhow::{Context, Result};
use lantern_core::{Catalog, DocumentRecord, MatcherRecord, ProfileRecord, SourceContext};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    Matcher(MatcherRecord),
    Profile(ProfileRecord),
    Document(DocumentRecord),
}

/// Outcome of one directory load.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub documents: usize,
    pub profiles: usize,
    pub matchers: usize,
    /// Records that failed to construct and were skipped.
    pub rejected: usize,
    /// Entities applied but carrying a validation error (e.g. a dangling
    /// reference).
    pub degraded: usize,
}

/// Parse every YAML document in a string into manifests.
pub fn parse_manifests(content: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        manifests.push(serde_yaml::from_value(value)?);
    }
    Ok(manifests)
}

/// Load all `*.yaml`/`*.yml` files under `dir` into the catalog.
pub async fn load_dir(catalog: &Catalog, ctx: &SourceContext, dir: &Path) -> Result<LoadSummary> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading manifest dir {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::new();
    for path in &paths {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let parsed = parse_manifests(&content)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        manifests.extend(parsed);
    }

    Ok(apply_manifests(catalog, ctx, manifests))
}

/// Apply manifests in dependency order (documents, profiles, matchers).
pub fn apply_manifests(
    catalog: &Catalog,
    ctx: &SourceContext,
    manifests: Vec<Manifest>,
) -> LoadSummary {
    let mut documents = Vec::new();
    let mut profiles = Vec::new();
    let mut matchers = Vec::new();
    for manifest in manifests {
        match manifest {
            Manifest::Document(r) => documents.push(r),
            Manifest::Profile(r) => profiles.push(r),
            Manifest::Matcher(r) => matchers.push(r),
        }
    }

    let mut summary = LoadSummary::default();

    for record in documents {
        match record.build(ctx) {
            Ok(document) => {
                info!(document = %document.name(), "found document");
                catalog.apply_document(document);
                summary.documents += 1;
            }
            Err(e) => {
                warn!(document = %record.name, error = %e, "invalid document");
                summary.rejected += 1;
            }
        }
    }

    for record in profiles {
        match record.build() {
            Ok(profile) => {
                let name = profile.name().clone();
                let (error, _) = catalog.apply_profile(profile);
                match error {
                    None => info!(profile = %name, "found profile"),
                    Some(e) => {
                        warn!(profile = %name, error = %e, "profile degraded");
                        summary.degraded += 1;
                    }
                }
                summary.profiles += 1;
            }
            Err(e) => {
                warn!(profile = %record.name, error = %e, "invalid profile");
                summary.rejected += 1;
            }
        }
    }

    for record in matchers {
        match record.build() {
            Ok(matcher) => {
                let name = matcher.name().clone();
                match catalog.apply_matcher(matcher) {
                    None => info!(matcher = %name, "found matcher"),
                    Some(e) => {
                        warn!(matcher = %name, error = %e, "matcher degraded");
                        summary.degraded += 1;
                    }
                }
                summary.matchers += 1;
            }
            Err(e) => {
                warn!(matcher = %record.name, error = %e, "invalid matcher");
                summary.rejected += 1;
            }
        }
    }

    summary
}
