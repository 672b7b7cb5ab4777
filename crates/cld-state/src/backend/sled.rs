//! Sled database backend
//!
//! Embedded KV storage for single-host installs that want crash safety
//! without a directory tree of JSON files. Keys are the same layout paths
//! the other backends use.

use super::StateBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Sled-based state backend
pub struct SledBackend {
    db: sled::Db,
    records: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a sled database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening sled state database at {:?}", path);
        let db = sled::open(path)?;
        let records = db.open_tree("records")?;
        Ok(Self { db, records })
    }

    /// Create a temporary in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let records = db.open_tree("records")?;
        Ok(Self { db, records })
    }
}

#[async_trait]
impl StateBackend for SledBackend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.records.get(path.as_bytes())? {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        debug!(path, "storing state record");
        self.records.insert(path.as_bytes(), data)?;
        self.records.flush_async().await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.records.remove(path.as_bytes())?;
        self.records.flush_async().await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for result in self.records.scan_prefix(prefix.as_bytes()) {
            let (key, _) = result?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.records.contains_key(path.as_bytes())?)
    }
}

impl Drop for SledBackend {
    fn drop(&mut self) {
        // Attempt to flush on drop
        if let Err(e) = self.db.flush() {
            tracing::error!("Failed to flush state database on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[smol_potat::test]
    async fn test_sled_backend_round_trip() {
        let backend = SledBackend::in_memory().unwrap();

        backend.write("a/one.json", b"1").await.unwrap();
        assert_eq!(backend.read("a/one.json").await.unwrap(), b"1");
        assert!(backend.exists("a/one.json").await.unwrap());

        backend.delete("a/one.json").await.unwrap();
        assert!(matches!(
            backend.read("a/one.json").await,
            Err(Error::NotFound(_))
        ));
    }

    #[smol_potat::test]
    async fn test_sled_backend_prefix_listing() {
        let backend = SledBackend::in_memory().unwrap();

        backend.write("a/b/one.json", b"1").await.unwrap();
        backend.write("a/b/two.json", b"2").await.unwrap();
        backend.write("a/c/three.json", b"3").await.unwrap();

        let listed = backend.list("a/b/").await.unwrap();
        assert_eq!(listed, vec!["a/b/one.json", "a/b/two.json"]);
    }

    #[smol_potat::test]
    async fn test_sled_backend_persistence() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        {
            let backend = SledBackend::new(&db_path).unwrap();
            for i in 0..5 {
                backend
                    .write(&format!("records/{i}.json"), format!("{i}").as_bytes())
                    .await
                    .unwrap();
            }
        }

        {
            let backend = SledBackend::new(&db_path).unwrap();
            let keys = backend.list("records/").await.unwrap();
            assert_eq!(keys.len(), 5);
        }
    }
}
