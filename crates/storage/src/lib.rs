//! Content store layer for relay
//!
//! This crate implements the content-addressed blob stores the channel
//! log writes records and snapshots into:
//! - ContentStore: put/get contract (handles are `0x` + sha-256 hex)
//! - MemoryContentStore: DashMap-sharded in-memory store
//! - FileContentStore: one file per blob, atomic rename on write
//! - FaultyContentStore: upload failure injection for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod faulty;
pub mod file;
pub mod memory;
pub mod store;

pub use faulty::FaultyContentStore;
pub use file::FileContentStore;
pub use memory::MemoryContentStore;
pub use store::{content_address, is_content_address, ContentStore, StoredBlob};
