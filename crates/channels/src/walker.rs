//! Hash chain traversal
//!
//! [`ChainWalker`] follows `prev_handle` links backward from a head,
//! fetching and decoding one record per step. It holds a single pending
//! handle, so memory and stack use stay constant however long the chain is;
//! `max_depth` bounds the number of fetches.

use crate::error::{ChannelError, Result};
use crate::record::{LogEntry, Record};
use relay_core::{ChannelHead, ChannelName, Handle};
use relay_storage::ContentStore;

/// Why a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStop {
    /// Reached the first record of the channel
    Root,
    /// `max_depth` records were fetched before the root
    DepthLimit,
    /// A record could not be fetched or decoded
    Failed,
}

/// Lazy newest-to-oldest iterator over a channel's records
pub struct ChainWalker<'a> {
    store: &'a dyn ContentStore,
    channel: ChannelName,
    next: Option<Handle>,
    remaining: usize,
    stop: Option<WalkStop>,
}

impl<'a> ChainWalker<'a> {
    /// Walk `channel` backward from `head`, fetching at most `max_depth` records
    pub fn new(
        store: &'a dyn ContentStore,
        channel: ChannelName,
        head: Handle,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            channel,
            next: Some(head),
            remaining: max_depth,
            stop: None,
        }
    }

    /// Why the walk ended, once it has
    pub fn stop(&self) -> Option<WalkStop> {
        self.stop
    }

    /// Handle the walk would fetch next
    pub fn pending(&self) -> Option<&Handle> {
        self.next.as_ref()
    }

    fn fetch(&self, handle: &Handle) -> Result<LogEntry> {
        let bytes = self.store.get(handle)?;
        let record = Record::decode(&bytes)?;
        if record.channel != self.channel {
            return Err(ChannelError::Decode(format!(
                "record {} belongs to {}, not {}",
                handle, record.channel, self.channel
            )));
        }
        Ok(record.entry(handle.clone()))
    }
}

impl Iterator for ChainWalker<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }
        let handle = match self.next.take() {
            Some(handle) => handle,
            None => {
                self.stop = Some(WalkStop::Root);
                return None;
            }
        };
        if self.remaining == 0 {
            self.next = Some(handle);
            self.stop = Some(WalkStop::DepthLimit);
            return None;
        }
        self.remaining -= 1;

        match self.fetch(&handle) {
            Ok(entry) => {
                self.next = entry.prev_handle.clone();
                Some(Ok(entry))
            }
            Err(e) => {
                self.next = Some(handle);
                self.stop = Some(WalkStop::Failed);
                Some(Err(e))
            }
        }
    }
}

/// Outcome of a chain walk recovery
#[derive(Debug)]
pub struct RecoveryReport {
    /// Channel recovered
    pub channel: ChannelName,
    /// Recovered entries, oldest first
    pub entries: Vec<LogEntry>,
    /// Why the walk ended
    pub stop: WalkStop,
    /// Head rebuilt from the walk
    pub head: ChannelHead,
    /// Entry count rebuilt from the walk
    pub entry_count: u64,
    /// Handle the walk stopped before, if it did not reach the root
    pub resume_from: Option<Handle>,
    /// Error that cut the walk short
    pub error: Option<ChannelError>,
}

impl RecoveryReport {
    /// Whether history older than `entries` was not recovered
    pub fn is_truncated(&self) -> bool {
        self.stop != WalkStop::Root
    }
}
