//! Head pointer and commit receipt types

use crate::clock::Millis;
use crate::types::{ChannelName, Handle};
use serde::{Deserialize, Serialize};

/// Latest committed record of a channel
///
/// `version` increases by exactly one per successful commit. Version 0 with
/// no handle is the initial, empty state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHead {
    /// Channel this head belongs to
    pub channel: ChannelName,
    /// Handle of the newest record, `None` for an empty channel
    pub head_handle: Option<Handle>,
    /// Number of accepted commits
    pub version: u64,
}

impl ChannelHead {
    /// The initial state of every channel
    pub fn empty(channel: ChannelName) -> Self {
        Self {
            channel,
            head_handle: None,
            version: 0,
        }
    }

    /// Whether no commit has been accepted yet
    pub fn is_empty(&self) -> bool {
        self.version == 0 && self.head_handle.is_none()
    }
}

/// Proof of a successful commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Channel written
    pub channel: ChannelName,
    /// Version the commit produced
    pub version: u64,
    /// New head handle
    pub head_handle: Handle,
    /// Commit time (milliseconds since epoch)
    pub committed_at: Millis,
}
