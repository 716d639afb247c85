//! In-memory content store
//!
//! Sharded by handle via DashMap: concurrent uploads only lock the target
//! shard, and reads never block writers on other shards.
//!
//! # Usage
//!
//! ```ignore
//! use relay_storage::{ContentStore, MemoryContentStore};
//!
//! let store = MemoryContentStore::new();
//! let blob = store.put(b"payload")?;
//! assert_eq!(store.get(&blob.handle)?, b"payload");
//! ```

use crate::store::{content_address, ContentStore, StoredBlob};
use dashmap::DashMap;
use relay_core::{Handle, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Content store held entirely in memory
///
/// Blobs are shared as `Arc<[u8]>`, so re-uploading identical content is a
/// map lookup and an overwrite of the same bytes.
pub struct MemoryContentStore {
    blobs: DashMap<Handle, Arc<[u8]>>,
    puts: AtomicU64,
    gets: AtomicU64,
}

impl MemoryContentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }

    /// Create with room for `capacity` blobs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blobs: DashMap::with_capacity(capacity),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }

    /// Number of distinct blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether no blob is stored
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Total number of `put` calls served
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Total number of `get` calls served
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Drop a blob, simulating loss in the backing service
    ///
    /// Returns true if the blob existed.
    pub fn remove(&self, handle: &Handle) -> bool {
        self.blobs.remove(handle).is_some()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let handle = content_address(bytes);
        self.blobs
            .entry(handle.clone())
            .or_insert_with(|| Arc::from(bytes));
        Ok(StoredBlob {
            handle,
            size: bytes.len(),
        })
    }

    fn get(&self, handle: &Handle) -> Result<Vec<u8>, StoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .get(handle)
            .map(|blob| blob.value().to_vec())
            .ok_or_else(|| StoreError::NotFound(handle.clone()))
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.blobs.contains_key(handle)
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContentStore")
            .field("blobs", &self.len())
            .field("puts", &self.put_count())
            .field("gets", &self.get_count())
            .finish()
    }
}
