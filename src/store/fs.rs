//! Local filesystem object store
//!
//! Every location is a directory under a root; keys may contain `/` and map
//! to nested files. Writes go to a temp file and are renamed into place.

use super::ObjectStore;
use crate::error::{CdrError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

/// Directory-backed `ObjectStore`
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every location
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location_dir(&self, location: &str) -> Result<PathBuf> {
        let relative = safe_relative(location)
            .ok_or_else(|| CdrError::transfer(location, "", "invalid location name"))?;
        Ok(self.root.join(relative))
    }

    fn object_path(&self, location: &str, key: &str) -> Result<PathBuf> {
        let relative = safe_relative(key)
            .ok_or_else(|| CdrError::transfer(location, key, "invalid object key"))?;
        Ok(self.location_dir(location)?.join(relative))
    }
}

/// Relative path made only of normal components
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download(&self, location: &str, key: &str) -> Result<Bytes> {
        let path = self.object_path(location, key)?;
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| CdrError::transfer(location, key, e))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Object read from disk");
        Ok(Bytes::from(content))
    }

    async fn upload(&self, location: &str, key: &str, content: Bytes) -> Result<()> {
        let dir = self.location_dir(location)?;
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(CdrError::transfer(location, key, "location does not exist"));
        }

        let path = self.object_path(location, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CdrError::transfer(location, key, e))?;
        }

        // Atomic write: temp file in the same directory, then rename
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| CdrError::transfer(location, key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CdrError::transfer(location, key, e));
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "Object written to disk");
        Ok(())
    }

    async fn ensure_destination_exists(&self, location: &str) -> Result<()> {
        let dir = self.location_dir(location)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CdrError::transfer(location, "", e))
    }

    fn name(&self) -> &str {
        "fs"
    }
}
