//! Lease types for channel locks
//!
//! A lock is a time-bounded mutual-exclusion grant over one channel.

use crate::clock::Millis;
use crate::types::{AgentId, ChannelName, LockToken};
use serde::{Deserialize, Serialize};

/// A live or expired lease over a channel
///
/// At most one unexpired lock exists per channel at any instant. The lock
/// can only be released or extended by presenting its `token` (or, for
/// release, its holder id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLock {
    /// Channel the lease covers
    pub channel: ChannelName,
    /// Agent holding the lease
    pub holder: AgentId,
    /// Secret identifying this lease
    pub token: LockToken,
    /// Acquisition time (milliseconds since epoch)
    pub acquired_at: Millis,
    /// Expiry time (milliseconds since epoch)
    pub expires_at: Millis,
}

impl ChannelLock {
    /// A lock is live strictly before its expiry instant
    pub fn is_live(&self, now: Millis) -> bool {
        self.expires_at > now
    }

    /// Milliseconds until expiry, zero once expired
    pub fn remaining_ms(&self, now: Millis) -> u64 {
        self.expires_at.saturating_sub(now).max(0) as u64
    }

    /// Read-only projection without the token
    pub fn view(&self) -> LockView {
        LockView {
            holder: self.holder.clone(),
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
        }
    }
}

/// Lock state exposed for observability (token omitted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockView {
    /// Agent holding the lease
    pub holder: AgentId,
    /// Acquisition time
    pub acquired_at: Millis,
    /// Expiry time
    pub expires_at: Millis,
}
