//! Local filesystem backend
//!
//! Writes go to a temporary file in the target directory and are renamed
//! into place, so a record is never observable half-written.

use super::StateBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Backend rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`; the directory is created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The backend's root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        match async_fs::read(self.full_path(path)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.full_path(path);
        if let Some(parent) = target.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        // Stage in the same directory so the rename stays on one filesystem
        let staging = target.with_extension(format!("tmp-{}", Uuid::new_v4()));
        async_fs::write(&staging, data).await?;
        async_fs::rename(&staging, &target).await?;
        debug!(path, bytes = data.len(), "wrote state record");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match async_fs::remove_file(self.full_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match async_fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next().await {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.relative_key(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }
}
