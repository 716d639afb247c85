//! Channel coordinator
//!
//! Composes the lease table, the head registry and the fork ledger into the
//! public lock/commit API.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Enter the channel's critical section
//! 2. If a live lease exists, require its token (else LOCKED)
//! 3. Compare expected_version with the live version
//!    a. equal, predecessor matches   -> advance head, release lease, receipt
//!    b. equal, predecessor differs   -> record fork, notify, CONFLICT(fork)
//!    c. not equal                    -> CONFLICT
//! 4. Publish events, leave the critical section
//! ```
//!
//! Every lock/commit pair for one channel is serialized by that channel's
//! section; different channels never share a section, so they never block
//! one another.

use crate::config::CoordinatorConfig;
use crate::events::{CoordinatorEvent, EventBus, EventSubscription};
use crate::fork::{ForkDetection, ForkLedger};
use crate::head::{CasOutcome, HeadRegistry};
use crate::lock::LockManager;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{
    AgentId, Branch, ChannelHead, ChannelLock, ChannelName, Clock, CommitError, ConflictError,
    ForkRecord, Handle, LockError, LockKey, LockToken, LockView, Resolution, SystemClock,
    WriteReceipt,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Arguments of [`Coordinator::commit_write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Channel to advance
    pub channel: ChannelName,
    /// Handle of the uploaded record
    pub new_handle: Handle,
    /// Head the writer believes it is extending
    pub claimed_prev: Option<Handle>,
    /// Version the writer read
    pub expected_version: u64,
    /// Committing agent
    pub writer: AgentId,
    /// Lease token, required while a lease is live
    pub lock_token: Option<LockToken>,
}

impl CommitRequest {
    /// Build a request without a lease token
    pub fn new(
        channel: impl Into<ChannelName>,
        new_handle: impl Into<Handle>,
        claimed_prev: Option<Handle>,
        expected_version: u64,
        writer: impl Into<AgentId>,
    ) -> Self {
        Self {
            channel: channel.into(),
            new_handle: new_handle.into(),
            claimed_prev,
            expected_version,
            writer: writer.into(),
            lock_token: None,
        }
    }

    /// Attach the lease token
    pub fn with_token(mut self, token: LockToken) -> Self {
        self.lock_token = Some(token);
        self
    }
}

/// Observability projection of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel name
    pub channel: ChannelName,
    /// Current head
    pub head: ChannelHead,
    /// Live lease, token omitted
    pub lock: Option<LockView>,
    /// Unresolved forks
    pub open_forks: usize,
}

/// Lock, head and fork coordination for every channel in the process
///
/// # Thread Safety
///
/// Each channel has its own critical section. Lease acquisition, commit,
/// fork resolution and head seeding for a channel all run inside it, which
/// rules out the race where two writers both validate against version N
/// before either applies.
pub struct Coordinator {
    locks: LockManager,
    heads: HeadRegistry,
    forks: ForkLedger,
    events: EventBus,
    sections: DashMap<ChannelName, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator on the system clock
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a coordinator on an explicit clock
    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        Coordinator {
            locks: LockManager::new(&config, Arc::clone(&clock)),
            heads: HeadRegistry::new(),
            forks: ForkLedger::new(),
            events: EventBus::new(config.event_buffer),
            sections: DashMap::new(),
            clock,
            config,
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Clock used for lease expiry and timestamps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Event bus shared with the channel layer
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    fn section(&self, channel: &ChannelName) -> Arc<Mutex<()>> {
        // Clone the Arc out so the DashMap shard guard is released before locking
        Arc::clone(
            self.sections
                .entry(channel.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    // ========================================================================
    // Leases
    // ========================================================================

    /// Acquire (or refresh) the lease on `channel`
    pub fn acquire_lock(
        &self,
        channel: &ChannelName,
        holder: &AgentId,
        ttl_ms: Option<u64>,
    ) -> Result<ChannelLock, LockError> {
        let section = self.section(channel);
        let _guard = section.lock();

        let lock = self.locks.acquire(channel, holder, ttl_ms)?;
        self.events.publish(CoordinatorEvent::LockAcquired {
            channel: channel.clone(),
            holder: holder.clone(),
            expires_at: lock.expires_at,
        });
        Ok(lock)
    }

    /// Release the lease named by a token or holder id
    ///
    /// Returns whether a live lease was removed.
    pub fn release_lock(&self, channel: &ChannelName, key: impl Into<LockKey>) -> bool {
        let section = self.section(channel);
        let _guard = section.lock();

        match self.locks.release(channel, key) {
            Some(lock) => {
                self.events.publish(CoordinatorEvent::LockReleased {
                    channel: channel.clone(),
                    holder: lock.holder,
                });
                true
            }
            None => false,
        }
    }

    /// Extend a live lease by token
    pub fn extend_lock(
        &self,
        channel: &ChannelName,
        token: &LockToken,
        ttl_ms: Option<u64>,
    ) -> Option<ChannelLock> {
        let section = self.section(channel);
        let _guard = section.lock();
        self.locks.extend(channel, token, ttl_ms)
    }

    /// Live lease on `channel`, token omitted
    pub fn get_lock(&self, channel: &ChannelName) -> Option<LockView> {
        self.locks.inspect(channel).map(|lock| lock.view())
    }

    // ========================================================================
    // Heads and commits
    // ========================================================================

    /// Current head of `channel`
    pub fn get_head(&self, channel: &ChannelName) -> ChannelHead {
        self.heads.get(channel)
    }

    /// Conditionally advance a channel head
    ///
    /// See the module docs for the decision table. A successful commit that
    /// presented a token also releases the lease.
    pub fn commit_write(&self, request: CommitRequest) -> Result<WriteReceipt, CommitError> {
        let CommitRequest {
            channel,
            new_handle,
            claimed_prev,
            expected_version,
            writer,
            lock_token,
        } = request;

        let section = self.section(&channel);
        let _guard = section.lock();

        self.locks.check_token(&channel, lock_token.as_ref())?;

        let now = self.clock.now_millis();
        match self.heads.compare_and_swap(
            &channel,
            expected_version,
            claimed_prev.as_ref(),
            new_handle.clone(),
        ) {
            CasOutcome::Applied(head) => {
                if let Some(token) = &lock_token {
                    if let Some(lock) = self.locks.release(&channel, token) {
                        self.events.publish(CoordinatorEvent::LockReleased {
                            channel: channel.clone(),
                            holder: lock.holder,
                        });
                    }
                }

                debug!(channel = %channel, version = head.version, writer = %writer, "Committed head");
                self.events.publish(CoordinatorEvent::HeadUpdated {
                    channel: channel.clone(),
                    version: head.version,
                    head: new_handle.clone(),
                    writer: Some(writer),
                    committed_at: now,
                });

                Ok(WriteReceipt {
                    channel,
                    version: head.version,
                    head_handle: new_handle,
                    committed_at: now,
                })
            }
            CasOutcome::PredecessorMismatch(live) => {
                let record = self.forks.record(ForkDetection {
                    channel: channel.clone(),
                    branch_a: Branch {
                        handle: live.head_handle.clone(),
                        version: live.version,
                    },
                    branch_b: Branch {
                        handle: Some(new_handle),
                        version: expected_version,
                    },
                    claimed_prev,
                    detected_by: writer.clone(),
                    detected_at: now,
                });
                warn!(
                    channel = %channel,
                    fork_id = record.id,
                    version = live.version,
                    writer = %writer,
                    "Fork detected: predecessor does not match live head"
                );
                self.events.publish(CoordinatorEvent::ForkDetected(record));

                Err(CommitError::Conflict(ConflictError {
                    current_version: live.version,
                    current_head: live.head_handle,
                    your_version: expected_version,
                    fork: true,
                }))
            }
            CasOutcome::VersionMismatch(live) => {
                debug!(
                    channel = %channel,
                    expected = expected_version,
                    live = live.version,
                    writer = %writer,
                    "Stale commit rejected"
                );
                Err(CommitError::Conflict(ConflictError {
                    current_version: live.version,
                    current_head: live.head_handle,
                    your_version: expected_version,
                    fork: false,
                }))
            }
        }
    }

    /// Install a head rebuilt by recovery
    ///
    /// Refused (returns false) if the live head is already at or past
    /// `version`.
    pub fn seed_head(&self, channel: &ChannelName, handle: Option<Handle>, version: u64) -> bool {
        let section = self.section(channel);
        let _guard = section.lock();
        let seeded = self.heads.seed(channel, handle, version);
        if seeded {
            info!(channel = %channel, version, "Seeded channel head");
        }
        seeded
    }

    // ========================================================================
    // Forks
    // ========================================================================

    /// Fork records for one channel, or all, oldest first
    pub fn get_forks(&self, channel: Option<&ChannelName>) -> Vec<ForkRecord> {
        self.forks.list(channel)
    }

    /// Resolve the most recent unresolved fork on `channel`
    ///
    /// With `resolved_handle`, the head is advanced to it as a synthetic merge
    /// commit (`version += 1`). Returns false if nothing was open.
    pub fn resolve_fork(
        &self,
        channel: &ChannelName,
        resolution: Resolution,
        resolved_handle: Option<Handle>,
    ) -> bool {
        let section = self.section(channel);
        let _guard = section.lock();

        let now = self.clock.now_millis();
        let record = match self
            .forks
            .resolve_latest(channel, resolution, resolved_handle.clone(), now)
        {
            Some(record) => record,
            None => return false,
        };

        if let Some(handle) = resolved_handle {
            let head = self.heads.advance(channel, handle.clone());
            self.events.publish(CoordinatorEvent::HeadUpdated {
                channel: channel.clone(),
                version: head.version,
                head: handle,
                writer: None,
                committed_at: now,
            });
        }

        info!(
            channel = %channel,
            fork_id = record.id,
            resolution = %resolution,
            "Fork resolved"
        );
        self.events.publish(CoordinatorEvent::ForkResolved(record));
        true
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Every known channel with its head, lease and open fork count
    pub fn list_channels(&self) -> Vec<ChannelStatus> {
        let names: BTreeSet<ChannelName> = self
            .heads
            .channels()
            .into_iter()
            .chain(self.locks.locked_channels())
            .collect();

        names
            .into_iter()
            .map(|channel| ChannelStatus {
                head: self.heads.get(&channel),
                lock: self.get_lock(&channel),
                open_forks: self.forks.open_count(&channel),
                channel,
            })
            .collect()
    }

    /// Disconnect all event subscribers
    ///
    /// Coordinator state is in-memory only; dropping the coordinator after
    /// this releases everything.
    pub fn shutdown(&self) {
        self.events.close();
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("channels", &self.sections.len())
            .field("locks", &self.locks)
            .field("events", &self.events)
            .finish()
    }
}
