//! Core types for relay
//!
//! This crate defines the vocabulary shared by every layer:
//! - Identifiers: channels, agents, content handles, lease tokens
//! - Coordination records: locks, heads, receipts, forks
//! - Error taxonomy: `LOCKED`, `CONFLICT`, content store failures
//! - Clock abstraction for lease expiry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod primitives;
pub mod types;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use error::{CommitError, ConflictError, LockError, StoreError};
pub use primitives::{
    Branch, ChannelHead, ChannelLock, ForkRecord, LockView, Resolution, WriteReceipt,
};
pub use types::{AgentId, ChannelName, Handle, LockKey, LockToken};
