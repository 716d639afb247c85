//! Concurrency layer for relay
//!
//! This crate implements channel coordination with:
//! - LockManager: TTL leases, lazily expired, token-authenticated
//! - HeadRegistry: versioned heads with compare-and-swap
//! - ForkLedger: divergent-history records and their resolutions
//! - EventBus: non-blocking fan-out of commit/fork notifications
//! - Coordinator: per-channel critical sections tying it all together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod events;
pub mod fork;
pub mod head;
pub mod lock;

pub use config::CoordinatorConfig;
pub use coordinator::{ChannelStatus, CommitRequest, Coordinator};
pub use events::{CoordinatorEvent, EventBus, EventSubscription};
pub use fork::{ForkDetection, ForkLedger};
pub use head::{CasOutcome, HeadRegistry};
pub use lock::LockManager;
