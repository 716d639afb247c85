//! Identifier types shared by every layer
//!
//! This module defines the names that flow through the coordination core:
//! - [`ChannelName`]: Name of an independently ordered append-only log
//! - [`AgentId`]: Identity of a writer or subscriber
//! - [`Handle`]: Opaque content-store reference to a stored blob
//! - [`LockToken`]: Secret presented to release or use a channel lease

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string as this identifier
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier and return the inner string
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Name of a channel
    ///
    /// Channels are independent: operations on two different names never
    /// contend with each other.
    ChannelName
);

string_id!(
    /// Identity of an agent process (writer, lock holder, subscriber)
    AgentId
);

string_id!(
    /// Content-addressed reference returned by a content store
    ///
    /// Handles are opaque to the coordination core. Two handles are the
    /// same blob if and only if they compare equal.
    Handle
);

string_id!(
    /// Lease token proving ownership of a channel lock
    LockToken
);

impl LockToken {
    /// Generate a fresh random token (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Either a lease token or the holder's agent id
///
/// Lock release accepts both: the token is authoritative, the holder id is
/// a convenience for agents that did not keep the token around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockKey {
    /// Release by token
    Token(LockToken),
    /// Release by holder identity
    Holder(AgentId),
}

impl From<LockToken> for LockKey {
    fn from(token: LockToken) -> Self {
        LockKey::Token(token)
    }
}

impl From<&LockToken> for LockKey {
    fn from(token: &LockToken) -> Self {
        LockKey::Token(token.clone())
    }
}

impl From<AgentId> for LockKey {
    fn from(holder: AgentId) -> Self {
        LockKey::Holder(holder)
    }
}

impl From<&AgentId> for LockKey {
    fn from(holder: &AgentId) -> Self {
        LockKey::Holder(holder.clone())
    }
}
