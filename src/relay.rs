//! Main entry point for relay.
//!
//! This module provides the `Relay` struct, which wires a content store,
//! a coordinator and a channel directory into ready-to-use channel logs.

use crate::config::RelayConfig;
use crate::error::Result;
use relay_channels::{ChannelDirectory, ChannelLog};
use relay_concurrency::{ChannelStatus, Coordinator, EventSubscription};
use relay_core::{AgentId, Clock, SystemClock};
use relay_storage::{ContentStore, FileContentStore, MemoryContentStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A relay instance.
///
/// One instance per process: it owns the coordinator and the channel
/// directory, and hands out [`ChannelLog`] views bound to individual agents.
///
/// # Example
///
/// ```ignore
/// use relaydb::prelude::*;
///
/// let relay = Relay::ephemeral()?;
/// let log = relay.log_for("planner");
///
/// let entry = log.write(&"tasks".into(), b"draft plan", None)?;
/// assert_eq!(entry.version, 1);
///
/// relay.shutdown();
/// ```
pub struct Relay {
    store: Arc<dyn ContentStore>,
    coordinator: Option<Arc<Coordinator>>,
    directory: Arc<ChannelDirectory>,
    log: ChannelLog,
    config: RelayConfig,
}

impl Relay {
    /// Open a relay whose content store is the directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).build()
    }

    /// Create a relay over an in-memory content store.
    ///
    /// Nothing touches the disk and everything is lost on drop.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for relay configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let relay = Relay::builder()
    ///     .config(RelayConfig::from_file("relay.toml")?)
    ///     .content_store(Arc::new(MemoryContentStore::new()))
    ///     .build()?;
    /// ```
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    /// Channel log that writes as `agent`.
    pub fn log_for(&self, agent: impl Into<AgentId>) -> ChannelLog {
        self.log.as_agent(agent)
    }

    /// Coordinator, absent in single-writer mode.
    pub fn coordinator(&self) -> Option<&Arc<Coordinator>> {
        self.coordinator.as_ref()
    }

    /// Channel directory.
    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    /// Content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Configuration in effect.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Subscribe to commit, fork, lease, append and snapshot events.
    pub fn subscribe_events(&self) -> EventSubscription {
        self.log.subscribe()
    }

    /// Head, lease and fork projection of every coordinated channel.
    pub fn list_channels(&self) -> Vec<ChannelStatus> {
        self.coordinator
            .as_ref()
            .map(|c| c.list_channels())
            .unwrap_or_default()
    }

    /// Wait for background snapshots, then disconnect event subscribers.
    ///
    /// Coordinator state is in-memory; durable channel state lives in the
    /// content store as records and snapshots.
    pub fn shutdown(&self) {
        let snapshots = self.log.wait_for_snapshots();
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown();
        }
        info!(channels = self.directory.len(), snapshots, "Relay shut down");
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("coordinated", &self.coordinator.is_some())
            .field("channels", &self.directory.len())
            .finish()
    }
}

/// Builder for relay configuration.
///
/// Without a content store or path the relay runs on a
/// [`MemoryContentStore`].
pub struct RelayBuilder {
    config: RelayConfig,
    store: Option<Arc<dyn ContentStore>>,
    path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
}

impl RelayBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            store: None,
            path: None,
            clock: None,
        }
    }

    /// Use `config`.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing content store.
    pub fn content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self.path = None;
        self
    }

    /// Store blobs in the directory at `path`.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self.store = None;
        self
    }

    /// Use `clock` for lease expiry and timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Run without a coordinator (single writer per channel only).
    pub fn uncoordinated(mut self) -> Self {
        self.config.coordinated = false;
        self
    }

    /// Build the relay.
    pub fn build(self) -> Result<Relay> {
        self.config.validate()?;

        let store: Arc<dyn ContentStore> = match (self.store, self.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileContentStore::open(path)?),
            (None, None) => Arc::new(MemoryContentStore::new()),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let directory = Arc::new(ChannelDirectory::new());

        let coordinator = self.config.coordinated.then(|| {
            Arc::new(Coordinator::with_clock(
                self.config.coordinator.clone(),
                Arc::clone(&clock),
            ))
        });

        let mut log = ChannelLog::new(Arc::clone(&store), AgentId::from("relay"))
            .with_directory(Arc::clone(&directory))
            .with_config(self.config.log.clone())
            .with_clock(clock);
        if let Some(coordinator) = &coordinator {
            log = log.with_coordinator(Arc::clone(coordinator));
        }

        info!(coordinated = coordinator.is_some(), "Relay ready");
        Ok(Relay {
            store,
            coordinator,
            directory,
            log,
            config: self.config,
        })
    }
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
