//! Channel layer for relay
//!
//! Append-only channel logs whose records live in a content store:
//! - ChannelLog: coordinated write with retry, reads, snapshots, recovery
//! - ChannelDirectory: manifests, subscribers and snapshot pointers
//! - Record / LogEntry: the stored record format and its index entry
//! - ChainWalker: bounded lazy traversal of `prev_handle` links

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod directory;
pub mod error;
pub mod log;
pub mod record;
pub mod snapshot;
pub mod walker;

pub use config::{Backoff, ChannelLogConfig, SnapshotMode};
pub use directory::{ChannelDirectory, ChannelManifest};
pub use error::{ChannelError, Result};
pub use log::{ChannelLog, ReadOptions};
pub use record::{content_hash, LogEntry, Record, RECORD_FORMAT};
pub use snapshot::{Snapshot, SNAPSHOT_FORMAT};
pub use walker::{ChainWalker, RecoveryReport, WalkStop};
