//! In-memory object store for development and testing
//!
//! Keeps objects in nested maps behind a `RwLock` and counts every
//! operation so tests can assert which calls happened.

use super::ObjectStore;
use crate::error::{CdrError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub downloads: usize,
    pub uploads: usize,
    pub ensures: usize,
}

/// In-memory `ObjectStore`
#[derive(Default)]
pub struct MemoryObjectStore {
    locations: Arc<RwLock<HashMap<String, HashMap<String, Bytes>>>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    ensures: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryObjectStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, creating its location
    pub async fn insert(&self, location: &str, key: &str, content: impl Into<Bytes>) {
        let mut locations = self.locations.write().await;
        locations
            .entry(location.to_string())
            .or_default()
            .insert(key.to_string(), content.into());
    }

    /// Read an object without counting it as a download
    pub async fn get(&self, location: &str, key: &str) -> Option<Bytes> {
        let locations = self.locations.read().await;
        locations.get(location).and_then(|objects| objects.get(key)).cloned()
    }

    /// Whether `location` exists
    pub async fn has_location(&self, location: &str) -> bool {
        self.locations.read().await.contains_key(location)
    }

    /// Keys in a location, sorted
    pub async fn keys(&self, location: &str) -> Vec<String> {
        let locations = self.locations.read().await;
        let mut keys: Vec<String> = locations
            .get(location)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Make every subsequent upload fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the operation counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            downloads: self.downloads.load(Ordering::SeqCst),
            uploads: self.uploads.load(Ordering::SeqCst),
            ensures: self.ensures.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, location: &str, key: &str) -> Result<Bytes> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        self.get(location, key)
            .await
            .ok_or_else(|| CdrError::transfer(location, key, "object not found"))
    }

    async fn upload(&self, location: &str, key: &str, content: Bytes) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CdrError::transfer(location, key, "write rejected"));
        }

        let mut locations = self.locations.write().await;
        let objects = locations
            .get_mut(location)
            .ok_or_else(|| CdrError::transfer(location, key, "location does not exist"))?;
        objects.insert(key.to_string(), content);

        tracing::debug!(location, key, "Object stored in memory");
        Ok(())
    }

    async fn ensure_destination_exists(&self, location: &str) -> Result<()> {
        self.ensures.fetch_add(1, Ordering::SeqCst);

        let mut locations = self.locations.write().await;
        locations.entry(location.to_string()).or_default();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
