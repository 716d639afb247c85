//! Channel records and log entries
//!
//! A record is the blob uploaded to the content store for each write. It
//! carries the payload together with the handle of its predecessor, so the
//! records of a channel form a singly linked list rooted at `None`:
//!
//! ```text
//! head ──prev──▶ record v3 ──prev──▶ record v2 ──prev──▶ record v1 ──prev──▶ None
//! ```
//!
//! Records are encoded as JSON with the payload in base64. `content_hash`
//! is the lowercase hex sha-256 of the raw payload and is checked on
//! every decode.

use crate::error::{ChannelError, Result};
use base64::engine::general_purpose::STANDARD;
use relay_core::{AgentId, ChannelName, Handle, Millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Format tag written into every record
pub const RECORD_FORMAT: &str = "relay.record.v1";

/// Lowercase hex sha-256 of `payload`
pub fn content_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// One channel write as stored in the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Format tag, always [`RECORD_FORMAT`]
    pub format: String,
    /// Unique entry id
    pub id: String,
    /// Channel written
    pub channel: ChannelName,
    /// Writing agent
    pub author_id: AgentId,
    /// Write time (milliseconds since epoch)
    pub timestamp: Millis,
    /// Handle of the predecessor record
    pub prev_handle: Option<Handle>,
    /// Version this record commits as
    pub version: u64,
    /// Hex sha-256 of `payload`
    pub content_hash: String,
    /// Opaque payload bytes
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Record {
    /// Build a record with a fresh id and computed content hash
    pub fn new(
        channel: ChannelName,
        author_id: AgentId,
        timestamp: Millis,
        prev_handle: Option<Handle>,
        version: u64,
        payload: Vec<u8>,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            format: RECORD_FORMAT.to_string(),
            id: uuid::Uuid::new_v4().simple().to_string(),
            channel,
            author_id,
            timestamp,
            prev_handle,
            version,
            content_hash: content_hash(&payload),
            payload,
            metadata,
        }
    }

    /// Serialize for upload
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    /// Parse and verify a stored record
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record: Record = serde_json::from_slice(bytes)?;
        if record.format != RECORD_FORMAT {
            return Err(ChannelError::Decode(format!(
                "unsupported record format: {}",
                record.format
            )));
        }
        record.verify()?;
        Ok(record)
    }

    /// Check the payload against `content_hash`
    pub fn verify(&self) -> Result<()> {
        let actual = content_hash(&self.payload);
        if actual != self.content_hash {
            return Err(ChannelError::Decode(format!(
                "content hash mismatch for entry {}: expected {}, found {}",
                self.id, self.content_hash, actual
            )));
        }
        Ok(())
    }

    /// Index entry for this record stored under `handle`
    pub fn entry(&self, handle: Handle) -> LogEntry {
        LogEntry {
            id: self.id.clone(),
            channel: self.channel.clone(),
            author_id: self.author_id.clone(),
            timestamp: self.timestamp,
            payload_handle: handle,
            prev_handle: self.prev_handle.clone(),
            content_hash: self.content_hash.clone(),
            version: self.version,
            metadata: self.metadata.clone(),
        }
    }
}

/// Committed entry of a channel log, without payload bytes
///
/// Immutable once created. `payload_handle` is the handle of the record
/// blob, which is also the channel head right after this entry committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique entry id
    pub id: String,
    /// Channel the entry belongs to
    pub channel: ChannelName,
    /// Writing agent
    pub author_id: AgentId,
    /// Write time (milliseconds since epoch)
    pub timestamp: Millis,
    /// Handle of the record blob
    pub payload_handle: Handle,
    /// Handle of the predecessor record
    pub prev_handle: Option<Handle>,
    /// Hex sha-256 of the payload
    pub content_hash: String,
    /// Committed version
    pub version: u64,
    /// Caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

mod base64_bytes {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
