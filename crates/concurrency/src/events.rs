//! Coordinator event bus
//!
//! Commits, forks and lease changes are published to bounded per-subscriber
//! queues with `try_send`. A subscriber that falls behind (queue full) or
//! goes away (receiver dropped) is unsubscribed on the spot; publishing
//! never blocks the commit path and a slow consumer cannot affect
//! coordinator state.

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use relay_core::{AgentId, ChannelName, ForkRecord, Handle, Millis};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Notifications emitted by the coordinator and channel logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A lease was granted or refreshed
    LockAcquired {
        /// Channel leased
        channel: ChannelName,
        /// New holder
        holder: AgentId,
        /// Lease expiry
        expires_at: Millis,
    },
    /// A lease was released explicitly or by a successful commit
    LockReleased {
        /// Channel released
        channel: ChannelName,
        /// Former holder
        holder: AgentId,
    },
    /// A channel head advanced
    HeadUpdated {
        /// Channel advanced
        channel: ChannelName,
        /// New version
        version: u64,
        /// New head handle
        head: Handle,
        /// Committing agent; `None` for merge commits installed by fork resolution
        writer: Option<AgentId>,
        /// Commit time
        committed_at: Millis,
    },
    /// A fork was recorded
    ForkDetected(ForkRecord),
    /// A fork was resolved
    ForkResolved(ForkRecord),
    /// A log entry was appended and should reach the channel's subscribers
    EntryAppended {
        /// Channel appended to
        channel: ChannelName,
        /// Entry id
        entry_id: String,
        /// Committed version of the entry
        version: u64,
        /// Author
        author: AgentId,
        /// Subscribers registered on the channel manifest
        recipients: Vec<AgentId>,
    },
    /// A channel snapshot was written to the content store
    SnapshotTaken {
        /// Channel snapshotted
        channel: ChannelName,
        /// Snapshot blob handle
        handle: Handle,
        /// Entries covered
        entry_count: u64,
    },
}

impl CoordinatorEvent {
    /// Channel the event concerns
    pub fn channel(&self) -> &ChannelName {
        match self {
            CoordinatorEvent::LockAcquired { channel, .. }
            | CoordinatorEvent::LockReleased { channel, .. }
            | CoordinatorEvent::HeadUpdated { channel, .. }
            | CoordinatorEvent::EntryAppended { channel, .. }
            | CoordinatorEvent::SnapshotTaken { channel, .. } => channel,
            CoordinatorEvent::ForkDetected(record) | CoordinatorEvent::ForkResolved(record) => {
                &record.channel
            }
        }
    }
}

/// Receiving end of an event subscription
#[derive(Debug)]
pub struct EventSubscription {
    receiver: Receiver<CoordinatorEvent>,
    lagged: Arc<AtomicBool>,
}

impl EventSubscription {
    /// Block until the next event
    pub fn recv(&self) -> Result<CoordinatorEvent, RecvError> {
        self.receiver.recv()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Result<CoordinatorEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Next event if one is queued
    pub fn try_recv(&self) -> Result<CoordinatorEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// All currently queued events
    pub fn drain(&self) -> Vec<CoordinatorEvent> {
        self.receiver.try_iter().collect()
    }

    /// Whether this subscription was dropped for falling behind
    pub fn lagged(&self) -> bool {
        self.lagged.load(Ordering::Acquire)
    }
}

struct Subscriber {
    sender: Sender<CoordinatorEvent>,
    lagged: Arc<AtomicBool>,
}

struct BusState {
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber>,
    closed: bool,
}

/// Fan-out of coordinator events to bounded subscriber queues
pub struct EventBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create a bus whose subscriber queues hold `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BusState {
                next_id: 0,
                subscribers: BTreeMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a new subscriber
    ///
    /// Subscribing to a closed bus yields a subscription that is already
    /// disconnected.
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        let lagged = Arc::new(AtomicBool::new(false));
        let mut state = self.state.lock();
        if !state.closed {
            state.next_id += 1;
            let id = state.next_id;
            state.subscribers.insert(
                id,
                Subscriber {
                    sender,
                    lagged: Arc::clone(&lagged),
                },
            );
        }
        EventSubscription { receiver, lagged }
    }

    /// Deliver `event` to every subscriber without blocking
    pub fn publish(&self, event: CoordinatorEvent) {
        let mut state = self.state.lock();
        if state.closed || state.subscribers.is_empty() {
            return;
        }

        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    subscriber.lagged.store(true, Ordering::Release);
                    warn!(subscriber = *id, channel = %event.channel(), "Dropping lagging event subscriber");
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => dropped.push(*id),
            }
        }

        for id in dropped {
            state.subscribers.remove(&id);
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Disconnect every subscriber and refuse new ones
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
