//! File-backed object bags
//!
//! Object-field document sources resolve against named key/value bags.
//! This implementation reads them from `<dir>/<namespace>/<name>.yaml`,
//! one bag per file.

use async_trait::async_trait;
use lantern_core::{Name, ObjectStore, SourceError, Value, Values};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

pub struct FileObjectStore {
    dir: PathBuf,
}

impl FileObjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn bag_path(&self, name: &Name) -> PathBuf {
        self.dir
            .join(name.namespace())
            .join(format!("{}.yaml", name.name()))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn get(&self, name: &Name) -> Result<Option<Values>, SourceError> {
        let path = self.bag_path(name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(object = %name, path = %path.display(), "object bag not found");
                return Ok(None);
            }
            Err(e) => return Err(SourceError::Store(e.to_string())),
        };
        let parsed: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| SourceError::Store(format!("{}: {}", path.display(), e)))?;
        match Value::from(parsed) {
            Value::Map(bag) => Ok(Some(bag)),
            _ => Err(SourceError::Store(format!(
                "{}: object bag must be a keyed map",
                path.display()
            ))),
        }
    }
}
