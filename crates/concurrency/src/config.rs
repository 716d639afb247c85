//! Coordinator configuration

use serde::Deserialize;

/// Tunables for lease handling and event delivery
///
/// ```ignore
/// let config = CoordinatorConfig::default()
///     .default_lock_ttl_ms(5_000)
///     .max_lock_ttl_ms(60_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Lease length when the caller does not ask for one
    pub default_lock_ttl_ms: u64,
    /// Upper bound applied to every caller-supplied lease length
    pub max_lock_ttl_ms: u64,
    /// Per-subscriber event queue capacity
    pub event_buffer: usize,
}

impl CoordinatorConfig {
    /// Set the default lease length
    pub fn default_lock_ttl_ms(mut self, ms: u64) -> Self {
        self.default_lock_ttl_ms = ms;
        self
    }

    /// Set the lease cap
    pub fn max_lock_ttl_ms(mut self, ms: u64) -> Self {
        self.max_lock_ttl_ms = ms;
        self
    }

    /// Set the per-subscriber queue capacity
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Effective lease length for a request
    ///
    /// Falls back to the default, never exceeds the cap, and is at least 1ms.
    pub fn effective_ttl(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_lock_ttl_ms)
            .min(self.max_lock_ttl_ms)
            .max(1)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl_ms: 30_000,
            max_lock_ttl_ms: 300_000,
            event_buffer: 1024,
        }
    }
}
