//! Fault-injecting content store wrapper
//!
//! Used by tests to exercise the write protocol's handling of transient
//! upload failures without a real flaky backend.

use crate::store::{ContentStore, StoredBlob};
use relay_core::{Handle, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a store and fails a configurable number of upcoming `put` calls
#[derive(Debug)]
pub struct FaultyContentStore<S> {
    inner: S,
    failing_puts: AtomicUsize,
    failed: AtomicUsize,
}

impl<S: ContentStore> FaultyContentStore<S> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_puts: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` uploads fail with [`StoreError::Unavailable`]
    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Number of uploads that were failed on purpose
    pub fn injected_failures(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn take_fault(&self) -> bool {
        self.failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: ContentStore> ContentStore for FaultyContentStore<S> {
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        if self.take_fault() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected upload failure".to_string()));
        }
        self.inner.put(bytes)
    }

    fn get(&self, handle: &Handle) -> Result<Vec<u8>, StoreError> {
        self.inner.get(handle)
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.inner.contains(handle)
    }
}
