//! Channel log
//!
//! Append-only, hash-linked channel logs on top of the coordinator and a
//! content store.
//!
//! ## Write Sequence
//!
//! ```text
//! per attempt:
//!   1. acquire the channel lease            (LOCKED    -> back off, retry)
//!   2. read {head_handle, version}
//!   3. upload record { prev = head_handle }  (store err -> back off, retry)
//!   4. commit_write(expected = version)     (CONFLICT  -> back off, retry)
//!                                           (fork      -> return, no retry)
//!   5. tail cache, manifest, EntryAppended, threshold snapshot
//! ```
//!
//! Any failure after step 1 releases the lease before backing off. Once the
//! attempt budget is spent the last error is returned wrapped in
//! [`ChannelError::RetriesExhausted`].
//!
//! Without a coordinator the log runs steps 2, 3 and 5 only, reading the
//! head from the directory. That mode has no compare-and-swap guard and is
//! only safe with a single writer per channel.

use crate::config::{Backoff, ChannelLogConfig, SnapshotMode};
use crate::directory::{ChannelDirectory, ChannelManifest};
use crate::error::{ChannelError, Result};
use crate::record::{LogEntry, Record};
use crate::snapshot::Snapshot;
use crate::walker::{ChainWalker, RecoveryReport, WalkStop};
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_concurrency::{CommitRequest, Coordinator, CoordinatorEvent, EventBus, EventSubscription};
use relay_core::{AgentId, ChannelHead, ChannelName, Clock, Handle, SystemClock, WriteReceipt};
use relay_storage::ContentStore;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Queue depth of the event bus used when no coordinator is attached
const STANDALONE_EVENT_BUFFER: usize = 1024;

/// Filters for [`ChannelLog::read`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Only entries with a version greater than this
    pub since_version: Option<u64>,
    /// At most this many entries
    pub limit: Option<usize>,
}

impl ReadOptions {
    /// Entries committed after `version`
    pub fn since(mut self, version: u64) -> Self {
        self.since_version = Some(version);
        self
    }

    /// Cap the number of entries returned
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Newest entries of each channel, ordered by version
#[derive(Debug, Default)]
struct TailCache {
    tails: DashMap<ChannelName, VecDeque<LogEntry>>,
}

impl TailCache {
    fn push(&self, entry: LogEntry, limit: usize) {
        let mut tail = self.tails.entry(entry.channel.clone()).or_default();
        let at = tail.partition_point(|e| e.version <= entry.version);
        tail.insert(at, entry);
        while tail.len() > limit {
            tail.pop_front();
        }
    }

    fn read(&self, channel: &ChannelName, since: u64, limit: usize) -> Vec<LogEntry> {
        self.tails
            .get(channel)
            .map(|tail| {
                tail.iter()
                    .filter(|e| e.version > since)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn entries(&self, channel: &ChannelName) -> Vec<LogEntry> {
        self.read(channel, 0, usize::MAX)
    }

    fn replace(&self, channel: &ChannelName, entries: Vec<LogEntry>, limit: usize) {
        let mut tail: VecDeque<LogEntry> = entries.into();
        while tail.len() > limit {
            tail.pop_front();
        }
        self.tails.insert(channel.clone(), tail);
    }
}

/// Channel log bound to one writing agent
///
/// Clones share the store, coordinator, directory, caches and event bus;
/// [`ChannelLog::as_agent`] produces a view that writes as another agent.
#[derive(Clone)]
pub struct ChannelLog {
    author: AgentId,
    store: Arc<dyn ContentStore>,
    coordinator: Option<Arc<Coordinator>>,
    directory: Arc<ChannelDirectory>,
    tails: Arc<TailCache>,
    events: Arc<EventBus>,
    snapshots_in_flight: Arc<Mutex<HashSet<ChannelName>>>,
    background_snapshots: Arc<Mutex<Vec<JoinHandle<()>>>>,
    clock: Arc<dyn Clock>,
    config: ChannelLogConfig,
}

impl ChannelLog {
    /// Uncoordinated log over `store`, writing as `author`
    pub fn new(store: Arc<dyn ContentStore>, author: impl Into<AgentId>) -> Self {
        Self {
            author: author.into(),
            store,
            coordinator: None,
            directory: Arc::new(ChannelDirectory::new()),
            tails: Arc::new(TailCache::default()),
            events: Arc::new(EventBus::new(STANDALONE_EVENT_BUFFER)),
            snapshots_in_flight: Arc::new(Mutex::new(HashSet::new())),
            background_snapshots: Arc::new(Mutex::new(Vec::new())),
            clock: Arc::new(SystemClock),
            config: ChannelLogConfig::default(),
        }
    }

    /// Route writes through `coordinator` and adopt its clock and event bus
    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.clock = Arc::clone(coordinator.clock());
        self.coordinator = Some(coordinator);
        self
    }

    /// Share an existing channel directory
    pub fn with_directory(mut self, directory: Arc<ChannelDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ChannelLogConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the clock used for timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A view of this log that writes as `author`
    pub fn as_agent(&self, author: impl Into<AgentId>) -> Self {
        let mut log = self.clone();
        log.author = author.into();
        log
    }

    /// Agent this log writes as
    pub fn author(&self) -> &AgentId {
        &self.author
    }

    /// Channel directory
    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    /// Attached coordinator
    pub fn coordinator(&self) -> Option<&Arc<Coordinator>> {
        self.coordinator.as_ref()
    }

    /// Content store
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Configuration in effect
    pub fn config(&self) -> &ChannelLogConfig {
        &self.config
    }

    /// Whether writes go through the coordinator
    pub fn is_coordinated(&self) -> bool {
        self.coordinator.is_some()
    }

    fn bus(&self) -> &EventBus {
        match &self.coordinator {
            Some(coordinator) => coordinator.events(),
            None => &self.events,
        }
    }

    /// Subscribe to commit, fork, append and snapshot events
    pub fn subscribe(&self) -> EventSubscription {
        self.bus().subscribe()
    }

    /// Current head of `channel`
    pub fn head(&self, channel: &ChannelName) -> ChannelHead {
        match &self.coordinator {
            Some(coordinator) => coordinator.get_head(channel),
            None => self
                .directory
                .get(channel)
                .map(|m| m.head)
                .unwrap_or_else(|| ChannelHead::empty(channel.clone())),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Append `payload` to `channel`
    ///
    /// Lock contention, stale versions and transient store failures are
    /// retried with backoff. A fork is returned at once.
    pub fn write(
        &self,
        channel: &ChannelName,
        payload: &[u8],
        metadata: Option<Value>,
    ) -> Result<LogEntry> {
        let attempts = self.config.attempts();
        let mut backoff = Backoff::new(&self.config);
        let mut attempt = 1;

        loop {
            let result = match &self.coordinator {
                Some(coordinator) => {
                    self.attempt_coordinated(coordinator, channel, payload, &metadata)
                }
                None => self.attempt_uncoordinated(channel, payload, &metadata),
            };

            let err = match result {
                Ok(entry) => return Ok(entry),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= attempts {
                warn!(
                    channel = %channel,
                    author = %self.author,
                    attempts = attempt,
                    error = %err,
                    "Write retries exhausted"
                );
                return Err(ChannelError::RetriesExhausted {
                    channel: channel.clone(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            debug!(channel = %channel, attempt, error = %err, "Write attempt failed, backing off");
            backoff.wait();
            attempt += 1;
        }
    }

    fn attempt_coordinated(
        &self,
        coordinator: &Coordinator,
        channel: &ChannelName,
        payload: &[u8],
        metadata: &Option<Value>,
    ) -> Result<LogEntry> {
        let lock = coordinator.acquire_lock(channel, &self.author, None)?;
        let head = coordinator.get_head(channel);

        let committed = self
            .upload(channel, &head, payload, metadata)
            .and_then(|(record, handle)| {
                let request = CommitRequest {
                    channel: channel.clone(),
                    new_handle: handle.clone(),
                    claimed_prev: head.head_handle.clone(),
                    expected_version: head.version,
                    writer: self.author.clone(),
                    lock_token: Some(lock.token.clone()),
                };
                let receipt = coordinator.commit_write(request)?;
                Ok((record.entry(handle), receipt))
            });

        match committed {
            Ok((entry, receipt)) => Ok(self.finish_write(entry, &receipt)),
            Err(err) => {
                coordinator.release_lock(channel, &lock.token);
                Err(err)
            }
        }
    }

    fn attempt_uncoordinated(
        &self,
        channel: &ChannelName,
        payload: &[u8],
        metadata: &Option<Value>,
    ) -> Result<LogEntry> {
        let head = self.head(channel);
        let (record, handle) = self.upload(channel, &head, payload, metadata)?;
        let receipt = WriteReceipt {
            channel: channel.clone(),
            version: record.version,
            head_handle: handle.clone(),
            committed_at: record.timestamp,
        };
        Ok(self.finish_write(record.entry(handle), &receipt))
    }

    fn upload(
        &self,
        channel: &ChannelName,
        head: &ChannelHead,
        payload: &[u8],
        metadata: &Option<Value>,
    ) -> Result<(Record, Handle)> {
        let record = Record::new(
            channel.clone(),
            self.author.clone(),
            self.clock.now_millis(),
            head.head_handle.clone(),
            head.version + 1,
            payload.to_vec(),
            metadata.clone(),
        );
        let blob = self.store.put(&record.encode()?)?;
        Ok((record, blob.handle))
    }

    /// Post-commit bookkeeping; the commit itself can no longer fail
    fn finish_write(&self, entry: LogEntry, receipt: &WriteReceipt) -> LogEntry {
        let channel = entry.channel.clone();
        self.tails.push(entry.clone(), self.config.tail_cache_limit);

        self.directory
            .ensure(&channel, &self.author, receipt.committed_at);
        let manifest = match self.directory.record_commit(receipt) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(channel = %channel, version = receipt.version, error = %e, "Manifest update failed after commit");
                return entry;
            }
        };

        debug!(channel = %channel, version = entry.version, author = %entry.author_id, "Appended entry");
        self.bus().publish(CoordinatorEvent::EntryAppended {
            channel: channel.clone(),
            entry_id: entry.id.clone(),
            version: entry.version,
            author: entry.author_id.clone(),
            recipients: manifest.subscribers.iter().cloned().collect(),
        });

        let threshold = self.config.snapshot_threshold;
        if threshold > 0 && manifest.entry_count % threshold == 0 {
            self.trigger_snapshot(&channel);
        }
        entry
    }

    fn trigger_snapshot(&self, channel: &ChannelName) {
        if !self.snapshots_in_flight.lock().insert(channel.clone()) {
            debug!(channel = %channel, "Snapshot already in flight");
            return;
        }

        match self.config.snapshot_mode {
            SnapshotMode::Inline => self.run_triggered_snapshot(channel),
            SnapshotMode::Background => {
                let log = self.clone();
                let name = channel.clone();
                let spawned = std::thread::Builder::new()
                    .name("relay-snapshot".to_string())
                    .spawn(move || log.run_triggered_snapshot(&name));
                match spawned {
                    Ok(handle) => {
                        let mut running = self.background_snapshots.lock();
                        running.retain(|h| !h.is_finished());
                        running.push(handle);
                    }
                    Err(e) => {
                        self.snapshots_in_flight.lock().remove(channel);
                        error!(channel = %channel, error = %e, "Failed to spawn snapshot thread");
                    }
                }
            }
        }
    }

    /// Block until every background snapshot started so far has finished
    ///
    /// Returns the number of snapshot threads joined. A thread that panicked
    /// is logged and counted.
    pub fn wait_for_snapshots(&self) -> usize {
        let handles = std::mem::take(&mut *self.background_snapshots.lock());
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!(author = %self.author, "Background snapshot thread panicked");
            }
        }
        if joined > 0 {
            debug!(joined, "Background snapshots drained");
        }
        joined
    }

    fn run_triggered_snapshot(&self, channel: &ChannelName) {
        if let Err(e) = self.snapshot(channel) {
            error!(channel = %channel, error = %e, "Automatic snapshot failed");
        }
        self.snapshots_in_flight.lock().remove(channel);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Cached entries of `channel`, oldest first
    pub fn read(&self, channel: &ChannelName, options: ReadOptions) -> Vec<LogEntry> {
        self.tails.read(
            channel,
            options.since_version.unwrap_or(0),
            options.limit.unwrap_or(usize::MAX),
        )
    }

    /// Fetch and verify the record stored under `handle`
    pub fn read_record(&self, handle: &Handle) -> Result<Record> {
        Record::decode(&self.store.get(handle)?)
    }

    /// Payload bytes of `entry`, checked against its content hash
    pub fn read_payload(&self, entry: &LogEntry) -> Result<Vec<u8>> {
        let record = self.read_record(&entry.payload_handle)?;
        if record.id != entry.id || record.content_hash != entry.content_hash {
            return Err(ChannelError::Decode(format!(
                "record at {} does not match entry {}",
                entry.payload_handle, entry.id
            )));
        }
        Ok(record.payload)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Store the manifest and cached entries of `channel` as one blob
    pub fn snapshot(&self, channel: &ChannelName) -> Result<Handle> {
        let manifest = self
            .directory
            .get(channel)
            .ok_or_else(|| ChannelError::UnknownChannel(channel.clone()))?;
        let entry_count = manifest.entry_count;
        let now = self.clock.now_millis();
        let snapshot = Snapshot::new(manifest, self.tails.entries(channel), now);

        let blob = self.store.put(&snapshot.encode()?)?;
        self.directory
            .record_snapshot(channel, blob.handle.clone(), now)?;

        info!(
            channel = %channel,
            handle = %blob.handle,
            entries = snapshot.entries.len(),
            bytes = blob.size,
            "Stored channel snapshot"
        );
        self.bus().publish(CoordinatorEvent::SnapshotTaken {
            channel: channel.clone(),
            handle: blob.handle.clone(),
            entry_count,
        });
        Ok(blob.handle)
    }

    /// Install the channel state stored in snapshot `handle`
    ///
    /// Replaces the manifest and cached entries and seeds the coordinator
    /// head. A snapshot older than the live head is not installed; the live
    /// manifest is returned unchanged.
    pub fn restore_snapshot(&self, handle: &Handle) -> Result<ChannelManifest> {
        let snapshot = Snapshot::decode(&self.store.get(handle)?)?;
        let mut manifest = snapshot.manifest;
        manifest.snapshot_handle = Some(handle.clone());
        manifest.last_snapshot_at = Some(snapshot.taken_at);
        let channel = manifest.name.clone();

        let current = self.directory.get(&channel);
        let live_version = current
            .as_ref()
            .map(|m| m.head.version)
            .unwrap_or(0)
            .max(self.head(&channel).version);
        if manifest.head.version < live_version {
            warn!(
                channel = %channel,
                live = live_version,
                snapshot = manifest.head.version,
                handle = %handle,
                "Snapshot is older than the live head, keeping live state"
            );
            return Ok(current.unwrap_or(manifest));
        }

        if let Some(coordinator) = &self.coordinator {
            let head = &manifest.head;
            if !coordinator.seed_head(&channel, head.head_handle.clone(), head.version) {
                debug!(channel = %channel, version = head.version, "Coordinator already at snapshot head");
            }
        }

        let entries = snapshot.entries.len();
        self.tails
            .replace(&channel, snapshot.entries, self.config.tail_cache_limit);
        self.directory.replace(manifest.clone());

        info!(
            channel = %channel,
            version = manifest.head.version,
            entries,
            "Restored channel snapshot"
        );
        Ok(manifest)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Rebuild `channel` by walking back from `head`, using the configured depth
    pub fn recover(&self, channel: &ChannelName, head: &Handle) -> Result<RecoveryReport> {
        self.recover_channel(channel, head, self.config.default_recovery_depth)
    }

    /// Rebuild `channel` by walking back from `head` over at most `max_depth` records
    ///
    /// Fails only if the head record itself is unreadable. A later failure,
    /// or reaching `max_depth`, yields a truncated report holding the newest
    /// recovered entries. The manifest, tail cache and coordinator head are
    /// rebuilt from the walk unless they already describe a newer head.
    pub fn recover_channel(
        &self,
        channel: &ChannelName,
        head: &Handle,
        max_depth: usize,
    ) -> Result<RecoveryReport> {
        let mut walker = ChainWalker::new(self.store.as_ref(), channel.clone(), head.clone(), max_depth);
        let mut entries = Vec::new();
        let mut failure = None;
        for step in walker.by_ref() {
            match step {
                Ok(entry) => entries.push(entry),
                Err(e) if entries.is_empty() => return Err(e),
                Err(e) => failure = Some(e),
            }
        }
        let stop = walker.stop().unwrap_or(WalkStop::Root);
        let resume_from = match stop {
            WalkStop::Root => None,
            _ => walker.pending().cloned(),
        };
        entries.reverse();

        let newest = match entries.last() {
            Some(newest) => newest.clone(),
            None => {
                warn!(channel = %channel, head = %head, "Recovery depth is zero, nothing recovered");
                return Ok(RecoveryReport {
                    channel: channel.clone(),
                    entries,
                    stop,
                    head: ChannelHead::empty(channel.clone()),
                    entry_count: 0,
                    resume_from,
                    error: failure,
                });
            }
        };

        let rebuilt_head = ChannelHead {
            channel: channel.clone(),
            head_handle: Some(newest.payload_handle.clone()),
            version: newest.version,
        };
        let entry_count = match stop {
            WalkStop::Root => entries.len() as u64,
            _ => newest.version,
        };

        let oldest = &entries[0];
        let mut manifest = self.directory.get(channel).unwrap_or_else(|| {
            ChannelManifest::new(channel.clone(), oldest.author_id.clone(), oldest.timestamp)
        });
        if manifest.head.version <= rebuilt_head.version {
            manifest.head = rebuilt_head.clone();
            manifest.entry_count = entry_count;
            self.directory.replace(manifest);
            self.tails
                .replace(channel, entries.clone(), self.config.tail_cache_limit);
        } else {
            warn!(
                channel = %channel,
                live = manifest.head.version,
                recovered = rebuilt_head.version,
                "Directory already holds a newer head, keeping it"
            );
        }
        if let Some(coordinator) = &self.coordinator {
            coordinator.seed_head(channel, rebuilt_head.head_handle.clone(), rebuilt_head.version);
        }

        if stop == WalkStop::Root {
            info!(channel = %channel, entries = entries.len(), version = rebuilt_head.version, "Recovered channel");
        } else {
            warn!(
                channel = %channel,
                entries = entries.len(),
                version = rebuilt_head.version,
                stop = ?stop,
                "Recovered truncated channel history"
            );
        }

        Ok(RecoveryReport {
            channel: channel.clone(),
            entries,
            stop,
            head: rebuilt_head,
            entry_count,
            resume_from,
            error: failure,
        })
    }
}

impl std::fmt::Debug for ChannelLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLog")
            .field("author", &self.author)
            .field("coordinated", &self.is_coordinated())
            .field("channels", &self.directory.len())
            .field("background_snapshots", &self.background_snapshots.lock().len())
            .field("config", &self.config)
            .finish()
    }
}
