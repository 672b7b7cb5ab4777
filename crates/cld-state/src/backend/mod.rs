//! State storage backends
//!
//! The engine only sees this trait; concrete cloud backends (S3, GCS,
//! Azure Blob) implement the same surface out of tree.

mod local;
mod memory;
mod sled;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use sled::SledBackend;

use crate::Result;
use async_trait::async_trait;

/// Trait for state storage backends
///
/// Keys are forward-slash paths. Writes must be atomic per key; reads of
/// missing keys return [`crate::Error::NotFound`].
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the value at a path
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Atomically write the value at a path
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Delete the value at a path; deleting a missing key is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    /// List all keys under a prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether a key exists
    async fn exists(&self, path: &str) -> Result<bool>;
}
