//! Lease-based channel locks
//!
//! One lease per channel, identified by a random token and bounded by a TTL.
//! Expiry is evaluated lazily: there is no background sweeper, a lease whose
//! `expires_at <= now` is simply treated as absent by every operation and
//! dropped when next touched.
//!
//! ## Semantics
//!
//! | Operation | Live lease, same holder | Live lease, other holder | No live lease |
//! |-----------|-------------------------|--------------------------|---------------|
//! | acquire | refresh TTL, same token | `LockError` | new token |
//! | release | removed if token/holder match | `None` | `None` |
//! | extend | refresh TTL if token matches | `None` | `None` |

use crate::config::CoordinatorConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_core::{
    AgentId, ChannelLock, ChannelName, Clock, LockError, LockKey, LockToken, Millis,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-channel lease table
pub struct LockManager {
    locks: DashMap<ChannelName, ChannelLock>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl LockManager {
    /// Create an empty lease table
    pub fn new(config: &CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: DashMap::new(),
            clock,
            config: config.clone(),
        }
    }

    fn expiry(now: Millis, ttl_ms: u64) -> Millis {
        now.saturating_add(ttl_ms.min(i64::MAX as u64) as i64)
    }

    /// Acquire or refresh the lease on `channel` for `holder`
    ///
    /// Re-acquisition by the current holder before expiry keeps the token
    /// and pushes the expiry out, exactly like a fresh acquire would.
    pub fn acquire(
        &self,
        channel: &ChannelName,
        holder: &AgentId,
        ttl_ms: Option<u64>,
    ) -> Result<ChannelLock, LockError> {
        let now = self.clock.now_millis();
        let expires_at = Self::expiry(now, self.config.effective_ttl(ttl_ms));

        match self.locks.entry(channel.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.is_live(now) {
                    if existing.holder != *holder {
                        return Err(LockError {
                            holder: existing.holder.clone(),
                            expires_at: existing.expires_at,
                        });
                    }
                    existing.acquired_at = now;
                    existing.expires_at = expires_at;
                    debug!(channel = %channel, holder = %holder, expires_at, "Refreshed lock");
                    return Ok(existing.clone());
                }

                if existing.holder != *holder {
                    warn!(
                        channel = %channel,
                        previous = %existing.holder,
                        holder = %holder,
                        expired_at = existing.expires_at,
                        "Taking over expired lock"
                    );
                }
                let lock = Self::fresh(channel, holder, now, expires_at);
                entry.insert(lock.clone());
                debug!(channel = %channel, holder = %holder, expires_at, "Acquired lock");
                Ok(lock)
            }
            Entry::Vacant(entry) => {
                let lock = Self::fresh(channel, holder, now, expires_at);
                entry.insert(lock.clone());
                debug!(channel = %channel, holder = %holder, expires_at, "Acquired lock");
                Ok(lock)
            }
        }
    }

    fn fresh(channel: &ChannelName, holder: &AgentId, now: Millis, expires_at: Millis) -> ChannelLock {
        ChannelLock {
            channel: channel.clone(),
            holder: holder.clone(),
            token: LockToken::generate(),
            acquired_at: now,
            expires_at,
        }
    }

    /// Release the lease if `key` names it
    ///
    /// Returns the removed lease. Releasing an absent or expired lease
    /// returns `None` and never errors.
    pub fn release(&self, channel: &ChannelName, key: impl Into<LockKey>) -> Option<ChannelLock> {
        let key = key.into();
        let now = self.clock.now_millis();

        let removed = self
            .locks
            .remove_if(channel, |_, lock| lock.is_live(now) && matches_key(lock, &key))
            .map(|(_, lock)| lock);

        match &removed {
            Some(lock) => {
                debug!(channel = %channel, holder = %lock.holder, "Released lock");
            }
            None => {
                self.locks.remove_if(channel, |_, lock| !lock.is_live(now));
            }
        }
        removed
    }

    /// Push out the expiry of a live lease identified by `token`
    ///
    /// Returns `None` if the token no longer names a live lease.
    pub fn extend(
        &self,
        channel: &ChannelName,
        token: &LockToken,
        ttl_ms: Option<u64>,
    ) -> Option<ChannelLock> {
        let now = self.clock.now_millis();
        let expires_at = Self::expiry(now, self.config.effective_ttl(ttl_ms));

        let mut lock = self.locks.get_mut(channel)?;
        if !lock.is_live(now) || lock.token != *token {
            return None;
        }
        lock.expires_at = expires_at;
        debug!(channel = %channel, holder = %lock.holder, expires_at, "Extended lock");
        Some(lock.value().clone())
    }

    /// The live lease on `channel`, if any
    pub fn inspect(&self, channel: &ChannelName) -> Option<ChannelLock> {
        let now = self.clock.now_millis();
        if let Some(lock) = self.locks.get(channel) {
            if lock.is_live(now) {
                return Some(lock.value().clone());
            }
        }
        self.locks.remove_if(channel, |_, lock| !lock.is_live(now));
        None
    }

    /// Check that a commit may proceed on `channel`
    ///
    /// With no live lease anyone may commit. With a live lease the caller
    /// must present its token.
    pub fn check_token(
        &self,
        channel: &ChannelName,
        token: Option<&LockToken>,
    ) -> Result<(), LockError> {
        match self.inspect(channel) {
            Some(lock) if Some(&lock.token) != token => Err(LockError {
                holder: lock.holder,
                expires_at: lock.expires_at,
            }),
            _ => Ok(()),
        }
    }

    /// Channels with a live lease
    pub fn locked_channels(&self) -> Vec<ChannelName> {
        let now = self.clock.now_millis();
        self.locks
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

fn matches_key(lock: &ChannelLock, key: &LockKey) -> bool {
    match key {
        LockKey::Token(token) => lock.token == *token,
        LockKey::Holder(holder) => lock.holder == *holder,
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("entries", &self.locks.len())
            .field("default_ttl_ms", &self.config.default_lock_ttl_ms)
            .field("max_ttl_ms", &self.config.max_lock_ttl_ms)
            .finish()
    }
}
