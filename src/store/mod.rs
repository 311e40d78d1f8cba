//! Object store trait: the storage abstraction the pipeline reads and writes
//!
//! Each deployment backend (S3, GCS, Azure Blob, local disk, in-memory)
//! implements `ObjectStore`. Locations are buckets or containers, keys are
//! object names inside them.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub mod fs;
pub mod memory;

/// Core trait for storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object
    ///
    /// Fails with `CdrError::Transfer` when the object is missing or
    /// unreadable.
    async fn download(&self, location: &str, key: &str) -> Result<Bytes>;

    /// Write a whole object, replacing any existing one
    ///
    /// Fails with `CdrError::Transfer` when the write fails, including when
    /// `location` does not exist.
    async fn upload(&self, location: &str, key: &str, content: Bytes) -> Result<()>;

    /// Create `location` if it is absent; no-op if present
    async fn ensure_destination_exists(&self, location: &str) -> Result<()>;

    /// Store name (e.g., "memory", "fs")
    fn name(&self) -> &str;
}
