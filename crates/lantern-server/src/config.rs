//! Server configuration
//!
//! Loaded from a TOML file; every field has a default so a bare
//! `lantern serve` works against an empty manifest directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    pub listen: SocketAddr,

    /// Base path below which boot resources are served.
    pub base_path: String,

    /// Directory of YAML manifests (matchers, profiles, documents).
    pub manifest_dir: Option<PathBuf>,

    /// Directory of object bags for object-field sources.
    pub object_dir: Option<PathBuf>,

    /// Deadline for outbound fetches of remote sources, in seconds.
    pub fetch_timeout_secs: u64,

    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8180)),
            base_path: "/".to_string(),
            manifest_dir: None,
            object_dir: None,
            fetch_timeout_secs: 30,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Cache directory for remote content.
    pub dir: PathBuf,

    /// Entries older than this are evicted by the periodic cleanup, in
    /// seconds.
    pub ttl_secs: u64,

    /// Cleanup interval, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("/var/lib/lantern/cache"),
            ttl_secs: 3600,
            cleanup_interval_secs: 600,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load when the file exists, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.base_path, "/");
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_partial_config() {
        let cfg: ServerConfig = toml::from_str(
            r#"
listen = "127.0.0.1:9999"
base_path = "/boot"

[cache]
enabled = true
ttl_secs = 60
"#,
        )
        .unwrap();

        assert_eq!(cfg.listen.port(), 9999);
        assert_eq!(cfg.base_path, "/boot");
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_secs, 60);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.cache.cleanup_interval_secs, 600);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let parsed: Result<ServerConfig, _> = toml::from_str("shenanigans = true\n");
        assert!(parsed.is_err());
    }
}
