//! Convenient imports for relay.
//!
//! ```ignore
//! use relaydb::prelude::*;
//!
//! let relay = Relay::ephemeral()?;
//! relay.log_for("agent-a").write(&"ch".into(), b"hello", None)?;
//! ```

// Main entry point
pub use crate::relay::{Relay, RelayBuilder};
pub use crate::config::RelayConfig;

// Error handling
pub use crate::error::{Error, Result};

// Identifiers and coordination records
pub use relay_core::{
    AgentId, ChannelHead, ChannelLock, ChannelName, ForkRecord, Handle, LockToken, Resolution,
    WriteReceipt,
};

// Coordination
pub use relay_concurrency::{CommitRequest, Coordinator, CoordinatorEvent, EventSubscription};

// Channels
pub use relay_channels::{ChannelLog, ChannelManifest, LogEntry, ReadOptions};

// Content stores
pub use relay_storage::{ContentStore, FileContentStore, MemoryContentStore};

// Re-export serde_json for convenience
pub use serde_json::json;
