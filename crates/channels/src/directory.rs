//! Channel directory
//!
//! Registry of every known channel and its manifest. Manifests change only
//! through committed writes, snapshots, subscription management and
//! recovery; readers always receive owned copies.

use crate::error::{ChannelError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_core::{AgentId, ChannelHead, ChannelName, Handle, Millis, WriteReceipt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Descriptive state of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelManifest {
    /// Channel name
    pub name: ChannelName,
    /// Creation time
    pub created_at: Millis,
    /// Creating agent
    pub created_by: AgentId,
    /// Last committed head known to the directory
    pub head: ChannelHead,
    /// Committed entries
    pub entry_count: u64,
    /// Agents notified of new entries
    pub subscribers: BTreeSet<AgentId>,
    /// Optional payload schema, opaque to the log
    #[serde(default)]
    pub schema: Option<Value>,
    /// Most recent snapshot blob
    pub snapshot_handle: Option<Handle>,
    /// Time of the most recent snapshot
    pub last_snapshot_at: Option<Millis>,
}

impl ChannelManifest {
    /// Manifest of a freshly created, empty channel
    pub fn new(name: ChannelName, created_by: AgentId, created_at: Millis) -> Self {
        Self {
            head: ChannelHead::empty(name.clone()),
            name,
            created_at,
            created_by,
            entry_count: 0,
            subscribers: BTreeSet::new(),
            schema: None,
            snapshot_handle: None,
            last_snapshot_at: None,
        }
    }
}

/// All channel manifests of a process
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    manifests: DashMap<ChannelName, ChannelManifest>,
}

impl ChannelDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new channel
    ///
    /// Fails with [`ChannelError::ChannelExists`] if the name is taken.
    pub fn create(
        &self,
        name: &ChannelName,
        created_by: &AgentId,
        now: Millis,
    ) -> Result<ChannelManifest> {
        match self.manifests.entry(name.clone()) {
            Entry::Occupied(_) => Err(ChannelError::ChannelExists(name.clone())),
            Entry::Vacant(slot) => {
                let manifest = ChannelManifest::new(name.clone(), created_by.clone(), now);
                slot.insert(manifest.clone());
                debug!(channel = %name, created_by = %created_by, "Created channel");
                Ok(manifest)
            }
        }
    }

    /// Manifest of `name`, creating it if needed
    pub fn ensure(&self, name: &ChannelName, created_by: &AgentId, now: Millis) -> ChannelManifest {
        self.manifests
            .entry(name.clone())
            .or_insert_with(|| ChannelManifest::new(name.clone(), created_by.clone(), now))
            .value()
            .clone()
    }

    /// Manifest of `name`
    pub fn get(&self, name: &ChannelName) -> Option<ChannelManifest> {
        self.manifests.get(name).map(|m| m.value().clone())
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &ChannelName) -> bool {
        self.manifests.contains_key(name)
    }

    /// Every manifest, ordered by channel name
    pub fn list(&self) -> Vec<ChannelManifest> {
        let mut all: Vec<ChannelManifest> =
            self.manifests.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn update<T>(
        &self,
        name: &ChannelName,
        f: impl FnOnce(&mut ChannelManifest) -> T,
    ) -> Result<T> {
        let mut manifest = self
            .manifests
            .get_mut(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.clone()))?;
        Ok(f(manifest.value_mut()))
    }

    /// Add a subscriber; returns whether it was newly added
    pub fn subscribe(&self, name: &ChannelName, agent: &AgentId) -> Result<bool> {
        self.update(name, |m| m.subscribers.insert(agent.clone()))
    }

    /// Remove a subscriber; returns whether it was present
    pub fn unsubscribe(&self, name: &ChannelName, agent: &AgentId) -> Result<bool> {
        self.update(name, |m| m.subscribers.remove(agent))
    }

    /// Subscribers of `name`, empty for unknown channels
    pub fn subscribers(&self, name: &ChannelName) -> Vec<AgentId> {
        self.manifests
            .get(name)
            .map(|m| m.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Attach or clear the payload schema
    pub fn set_schema(&self, name: &ChannelName, schema: Option<Value>) -> Result<()> {
        self.update(name, |m| m.schema = schema)
    }

    /// Account for a committed write
    ///
    /// Commits can finish out of order; the head only moves forward.
    pub fn record_commit(&self, receipt: &WriteReceipt) -> Result<ChannelManifest> {
        self.update(&receipt.channel, |m| {
            m.entry_count += 1;
            if receipt.version > m.head.version {
                m.head.head_handle = Some(receipt.head_handle.clone());
                m.head.version = receipt.version;
            }
            m.clone()
        })
    }

    /// Record a stored snapshot
    pub fn record_snapshot(
        &self,
        name: &ChannelName,
        handle: Handle,
        now: Millis,
    ) -> Result<ChannelManifest> {
        self.update(name, |m| {
            m.snapshot_handle = Some(handle);
            m.last_snapshot_at = Some(now);
            m.clone()
        })
    }

    /// Install a manifest rebuilt by snapshot restore or recovery
    ///
    /// Returns the manifest it displaced.
    pub fn replace(&self, manifest: ChannelManifest) -> Option<ChannelManifest> {
        self.manifests.insert(manifest.name.clone(), manifest)
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether no channel is registered
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
