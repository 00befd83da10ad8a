//! On-disk remote-content cache
//!
//! Concrete implementation of the core cache contract: first fetch stores
//! the payload and its content type under the cache directory, later
//! requests are served from disk. A periodic cleanup evicts entries whose
//! files are older than the configured TTL.

use async_trait::async_trait;
use axum::http::{header, request::Parts};
use axum::response::Response;
use lantern_core::source::{content_response, error_response};
use lantern_core::{Cache, SourceError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

const MIME_SUFFIX: &str = ".mime";
const PART_SUFFIX: &str = ".part";

/// TTL-based disk cache keyed by URL.
pub struct DiskCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, fetch_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            dir: dir.into(),
            client,
        })
    }

    /// Create the cache directory.
    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        info!(dir = %self.dir.display(), "content cache initialized");
        Ok(())
    }

    fn entry_path(&self, url: &Url) -> PathBuf {
        self.dir
            .join(urlencoding::encode(url.as_str()).into_owned())
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<(Vec<u8>, String)>, SourceError> {
        match fs::read(path).await {
            Ok(data) => {
                let mime = fs::read_to_string(sidecar(path)).await.unwrap_or_default();
                Ok(Some((data, mime)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SourceError::Cache(e.to_string())),
        }
    }

    async fn fetch_and_store(&self, url: &Url) -> Result<(Vec<u8>, String), SourceError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(SourceError::Fetch {
                url: url.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }
        let mime = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let data = resp
            .bytes()
            .await
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_vec();

        let path = self.entry_path(url);
        if let Err(e) = self.store(&path, &data, &mime).await {
            // A failed store is not fatal for the request being served.
            warn!(url = %url, error = %e, "caching fetched content failed");
        } else {
            debug!(url = %url, bytes = data.len(), "cached");
        }
        Ok((data, mime))
    }

    async fn store(&self, path: &Path, data: &[u8], mime: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let tmp = with_suffix(path, PART_SUFFIX);
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        fs::write(sidecar(path), mime).await
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn sidecar(path: &Path) -> PathBuf {
    with_suffix(path, MIME_SUFFIX)
}

#[async_trait]
impl Cache for DiskCache {
    async fn bytes(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        let path = self.entry_path(url);
        if let Some((data, _)) = self.read_entry(&path).await? {
            return Ok(data);
        }
        let (data, _) = self.fetch_and_store(url).await?;
        Ok(data)
    }

    async fn serve(&self, url: &Url, _request: &Parts) -> Response {
        let path = self.entry_path(url);
        let entry = match self.read_entry(&path).await {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => self.fetch_and_store(url).await,
            Err(e) => Err(e),
        };
        match entry {
            Ok((data, mime)) => content_response(&mime, data),
            Err(e) => error_response(e.status(), e.to_string()),
        }
    }

    async fn cleanup(&self, ttl: Duration) -> Result<usize, SourceError> {
        let mut evicted = 0;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SourceError::Cache(e.to_string())),
        };
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| SourceError::Cache(e.to_string()))?;
            let Some(entry) = entry else {
                break;
            };
            let path = entry.path();
            let name = path.to_string_lossy();
            if name.ends_with(PART_SUFFIX) || name.ends_with(MIME_SUFFIX) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let expired = meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .map(|age| age >= ttl)
                .unwrap_or(false);
            if expired {
                if fs::remove_file(&path).await.is_ok() {
                    let _ = fs::remove_file(sidecar(&path)).await;
                    evicted += 1;
                    debug!(entry = %path.display(), "evicted");
                }
            }
        }
        if evicted > 0 {
            info!(evicted, "cache cleanup finished");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lantern-cache-test-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_bytes_served_from_disk_without_fetch() {
        let dir = temp_dir("hit");
        let cache = DiskCache::new(&dir, Duration::from_secs(1)).unwrap();

        // Pre-seed an entry; the URL's origin does not exist, so a hit
        // proves no fetch happened.
        let url = Url::parse("http://origin.invalid/image").unwrap();
        let path = cache.entry_path(&url);
        std::fs::write(&path, b"cached bytes").unwrap();

        let data = cache.bytes(&url).await.unwrap();
        assert_eq!(data, b"cached bytes");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_miss_on_unreachable_origin_fails() {
        let dir = temp_dir("miss");
        let cache = DiskCache::new(&dir, Duration::from_secs(1)).unwrap();

        let url = Url::parse("http://origin.invalid/image").unwrap();
        let err = cache.bytes(&url).await.unwrap_err();
        assert!(matches!(err, SourceError::Fetch { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cleanup_evicts_only_old_entries() {
        let dir = temp_dir("cleanup");
        let cache = DiskCache::new(&dir, Duration::from_secs(1)).unwrap();

        let url = Url::parse("http://origin.invalid/old").unwrap();
        let path = cache.entry_path(&url);
        std::fs::write(&path, b"old").unwrap();
        std::fs::write(sidecar(&path), "text/plain").unwrap();

        // Fresh files survive a generous TTL.
        assert_eq!(cache.cleanup(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(path.exists());

        // Everything is older than a zero TTL.
        assert_eq!(cache.cleanup(Duration::from_secs(0)).await.unwrap(), 1);
        assert!(!path.exists());
        assert!(!sidecar(&path).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_dir_is_noop() {
        let cache = DiskCache::new("/nonexistent/lantern-cache", Duration::from_secs(1)).unwrap();
        assert_eq!(cache.cleanup(Duration::from_secs(1)).await.unwrap(), 0);
    }
}
