//! In-memory backend for tests and dry runs

use super::StateBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Backend keeping all records in a process-local map
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when no keys are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys, for test assertions
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();

        backend.write("a/b/one.json", b"1").await.unwrap();
        backend.write("a/b/two.json", b"2").await.unwrap();
        backend.write("a/c/three.json", b"3").await.unwrap();

        assert_eq!(backend.read("a/b/one.json").await.unwrap(), b"1");
        assert!(backend.exists("a/b/two.json").await.unwrap());

        let listed = backend.list("a/b/").await.unwrap();
        assert_eq!(listed, vec!["a/b/one.json", "a/b/two.json"]);

        backend.delete("a/b/one.json").await.unwrap();
        assert!(!backend.exists("a/b/one.json").await.unwrap());
        assert!(matches!(
            backend.read("a/b/one.json").await,
            Err(Error::NotFound(_))
        ));

        // Deleting again is fine
        backend.delete("a/b/one.json").await.unwrap();
    }
}
