//! Channel snapshot codec
//!
//! A snapshot is the manifest plus the cached entry index of one channel,
//! stored as a single content store object. Entries carry handles and
//! metadata only; payload bytes stay in their record blobs.

use crate::directory::ChannelManifest;
use crate::error::{ChannelError, Result};
use crate::record::LogEntry;
use relay_core::Millis;
use serde::{Deserialize, Serialize};

/// Format tag written into every snapshot
pub const SNAPSHOT_FORMAT: &str = "relay.snapshot.v1";

/// Serialized state of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format tag, always [`SNAPSHOT_FORMAT`]
    pub format: String,
    /// Manifest at snapshot time
    pub manifest: ChannelManifest,
    /// Cached entries, oldest first
    pub entries: Vec<LogEntry>,
    /// Snapshot time
    pub taken_at: Millis,
}

impl Snapshot {
    /// Capture `manifest` and `entries`
    pub fn new(manifest: ChannelManifest, entries: Vec<LogEntry>, taken_at: Millis) -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            manifest,
            entries,
            taken_at,
        }
    }

    /// Serialize for upload
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    /// Parse a stored snapshot
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(ChannelError::Decode(format!(
                "unsupported snapshot format: {}",
                snapshot.format
            )));
        }
        if let Some(stray) = snapshot
            .entries
            .iter()
            .find(|e| e.channel != snapshot.manifest.name)
        {
            return Err(ChannelError::Decode(format!(
                "snapshot of {} contains entry {} of {}",
                snapshot.manifest.name, stray.id, stray.channel
            )));
        }
        Ok(snapshot)
    }
}
