//! Content store contract
//!
//! The coordination core treats the content store as an opaque,
//! content-addressed blob service. Encryption, upload retries and payment
//! mechanics live behind this trait.

use relay_core::{Handle, StoreError};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Content address of the blob
    pub handle: Handle,
    /// Size in bytes
    pub size: usize,
}

/// Content-addressed blob storage
///
/// # Contract
///
/// - `put` may fail transiently; callers retry.
/// - `get` fails permanently with [`StoreError::NotFound`] for unknown handles.
/// - Storing identical bytes twice yields the same handle.
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their handle
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError>;

    /// Fetch the bytes stored under `handle`
    fn get(&self, handle: &Handle) -> Result<Vec<u8>, StoreError>;

    /// Whether a blob exists for `handle`
    fn contains(&self, handle: &Handle) -> bool {
        self.get(handle).is_ok()
    }
}

impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        (**self).put(bytes)
    }

    fn get(&self, handle: &Handle) -> Result<Vec<u8>, StoreError> {
        (**self).get(handle)
    }

    fn contains(&self, handle: &Handle) -> bool {
        (**self).contains(handle)
    }
}

/// Compute the content address of `bytes`: `0x` followed by hex sha-256
pub fn content_address(bytes: &[u8]) -> Handle {
    Handle::new(format!("0x{}", hex::encode(Sha256::digest(bytes))))
}

/// Whether `handle` has the shape produced by [`content_address`]
pub fn is_content_address(handle: &Handle) -> bool {
    handle
        .as_str()
        .strip_prefix("0x")
        .map(|digest| digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false)
}
