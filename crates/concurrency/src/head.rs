//! Versioned head pointers
//!
//! The registry is the single source of truth for "what is the latest record"
//! of each channel. Every mutation is a compare-and-swap executed under the
//! DashMap shard guard for the channel, so no caller can observe a version
//! without its matching handle.

use dashmap::DashMap;
use relay_core::{ChannelHead, ChannelName, Handle};

/// Outcome of [`HeadRegistry::compare_and_swap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// Head advanced; carries the new head
    Applied(ChannelHead),
    /// Expected version was stale; carries the live head
    VersionMismatch(ChannelHead),
    /// Version matched but the claimed predecessor did not; carries the live head
    PredecessorMismatch(ChannelHead),
}

/// Per-channel `{head_handle, version}` table
#[derive(Debug, Default)]
pub struct HeadRegistry {
    heads: DashMap<ChannelName, ChannelHead>,
}

impl HeadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current head, or the empty head for unknown channels
    pub fn get(&self, channel: &ChannelName) -> ChannelHead {
        self.heads
            .get(channel)
            .map(|head| head.value().clone())
            .unwrap_or_else(|| ChannelHead::empty(channel.clone()))
    }

    /// Advance the head to `new_handle` iff it is at `expected_version` and
    /// points at `claimed_prev`
    pub fn compare_and_swap(
        &self,
        channel: &ChannelName,
        expected_version: u64,
        claimed_prev: Option<&Handle>,
        new_handle: Handle,
    ) -> CasOutcome {
        let mut head = self
            .heads
            .entry(channel.clone())
            .or_insert_with(|| ChannelHead::empty(channel.clone()));

        if head.version != expected_version {
            return CasOutcome::VersionMismatch(head.value().clone());
        }
        if head.head_handle.as_ref() != claimed_prev {
            return CasOutcome::PredecessorMismatch(head.value().clone());
        }

        head.version += 1;
        head.head_handle = Some(new_handle);
        CasOutcome::Applied(head.value().clone())
    }

    /// Unconditionally advance the head by one version
    ///
    /// Used for synthetic merge commits installed by fork resolution.
    pub fn advance(&self, channel: &ChannelName, new_handle: Handle) -> ChannelHead {
        let mut head = self
            .heads
            .entry(channel.clone())
            .or_insert_with(|| ChannelHead::empty(channel.clone()));
        head.version += 1;
        head.head_handle = Some(new_handle);
        head.value().clone()
    }

    /// Install a recovered head unless the live one is already newer
    ///
    /// Returns true if the head was installed.
    pub fn seed(&self, channel: &ChannelName, handle: Option<Handle>, version: u64) -> bool {
        let mut head = self
            .heads
            .entry(channel.clone())
            .or_insert_with(|| ChannelHead::empty(channel.clone()));
        if head.version > version || (head.version == version && head.head_handle.is_some()) {
            return false;
        }
        head.version = version;
        head.head_handle = handle;
        true
    }

    /// All channels that have ever been touched
    pub fn channels(&self) -> Vec<ChannelName> {
        self.heads.iter().map(|entry| entry.key().clone()).collect()
    }
}
