//! Coordination types for relay
//!
//! This module defines the canonical data structures the coordinator hands
//! out. They are shared between the `concurrency` and `channels` crates and
//! are read-only snapshots once returned to a caller.

pub mod fork;
pub mod head;
pub mod lock;

pub use fork::{Branch, ForkRecord, Resolution};
pub use head::{ChannelHead, WriteReceipt};
pub use lock::{ChannelLock, LockView};
