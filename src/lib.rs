//! # Relay
//!
//! Coordinated append-only channels for multi-agent systems.
//!
//! Agents share named, append-only logs ("channels") whose records live in a
//! content-addressed blob store. Relay serializes writers with TTL leases,
//! rejects lost updates with versioned compare-and-swap, records divergent
//! histories as forks, and rebuilds channel state from the store after a
//! restart.
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaydb::prelude::*;
//!
//! let relay = Relay::ephemeral()?;
//! let planner = relay.log_for("planner");
//!
//! let channel = ChannelName::from("tasks");
//! planner.write(&channel, b"draft plan", Some(json!({"kind": "plan"})))?;
//!
//! for entry in planner.read(&channel, ReadOptions::default()) {
//!     let bytes = planner.read_payload(&entry)?;
//! }
//! ```
//!
//! ## Layers
//!
//! - [`relay_core`] - identifiers, lock/head/fork records, error taxonomy
//! - [`relay_storage`] - content store contract and implementations
//! - [`relay_concurrency`] - lease manager, head registry, fork ledger, coordinator
//! - [`relay_channels`] - channel logs, directory, snapshots, recovery

#![warn(missing_docs)]

mod config;
mod error;
mod relay;

pub mod prelude;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use relay::{Relay, RelayBuilder};

pub use relay_channels;
pub use relay_concurrency;
pub use relay_core;
pub use relay_storage;
