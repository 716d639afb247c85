//! Relay configuration
//!
//! ```toml
//! coordinated = true
//!
//! [coordinator]
//! default_lock_ttl_ms = 30000
//! max_lock_ttl_ms = 300000
//! event_buffer = 1024
//!
//! [log]
//! max_write_retries = 5
//! base_backoff_ms = 10
//! max_backoff_ms = 1000
//! snapshot_threshold = 100
//! snapshot_mode = "background"
//! tail_cache_limit = 10000
//! default_recovery_depth = 10000
//! ```
//!
//! Every key is optional.

use crate::error::{Error, Result};
use relay_channels::ChannelLogConfig;
use relay_concurrency::CoordinatorConfig;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Route writes through the coordinator; `false` selects the
    /// single-writer fallback
    pub coordinated: bool,
    /// Lease and event settings
    pub coordinator: CoordinatorConfig,
    /// Write protocol, snapshot and recovery settings
    pub log: ChannelLogConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            coordinated: true,
            coordinator: CoordinatorConfig::default(),
            log: ChannelLogConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RelayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings that cannot work together
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.default_lock_ttl_ms == 0 {
            return Err(Error::Config("default_lock_ttl_ms must be positive".into()));
        }
        if self.coordinator.default_lock_ttl_ms > self.coordinator.max_lock_ttl_ms {
            return Err(Error::Config(format!(
                "default_lock_ttl_ms ({}) exceeds max_lock_ttl_ms ({})",
                self.coordinator.default_lock_ttl_ms, self.coordinator.max_lock_ttl_ms
            )));
        }
        if self.log.base_backoff_ms > self.log.max_backoff_ms {
            return Err(Error::Config(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.log.base_backoff_ms, self.log.max_backoff_ms
            )));
        }
        Ok(())
    }
}
