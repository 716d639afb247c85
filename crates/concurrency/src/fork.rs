//! Ledger of divergent-history events
//!
//! Records are append-only and kept in detection order. Resolution flips a
//! record's `resolved` flag in place; records are never removed.

use parking_lot::Mutex;
use relay_core::{AgentId, Branch, ChannelName, ForkRecord, Handle, Millis, Resolution};

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<ForkRecord>,
    next_id: u64,
}

/// Append-only list of detected forks
#[derive(Debug, Default)]
pub struct ForkLedger {
    state: Mutex<LedgerState>,
}

/// Inputs describing a newly detected fork
#[derive(Debug, Clone)]
pub struct ForkDetection {
    /// Channel that forked
    pub channel: ChannelName,
    /// Live head at detection time
    pub branch_a: Branch,
    /// Rejected commit's state
    pub branch_b: Branch,
    /// Predecessor the rejected commit claimed
    pub claimed_prev: Option<Handle>,
    /// Agent whose commit was rejected
    pub detected_by: AgentId,
    /// Detection time
    pub detected_at: Millis,
}

impl ForkLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unresolved record and return it
    pub fn record(&self, detection: ForkDetection) -> ForkRecord {
        let mut state = self.state.lock();
        state.next_id += 1;
        let record = ForkRecord {
            id: state.next_id,
            channel: detection.channel,
            branch_a: detection.branch_a,
            branch_b: detection.branch_b,
            claimed_prev: detection.claimed_prev,
            detected_by: detection.detected_by,
            detected_at: detection.detected_at,
            resolved: false,
            resolution: None,
            resolved_handle: None,
            resolved_at: None,
        };
        state.records.push(record.clone());
        record
    }

    /// Resolve the most recent unresolved fork on `channel`
    ///
    /// Returns the updated record, or `None` if nothing was open.
    pub fn resolve_latest(
        &self,
        channel: &ChannelName,
        resolution: Resolution,
        resolved_handle: Option<Handle>,
        now: Millis,
    ) -> Option<ForkRecord> {
        let mut state = self.state.lock();
        let record = state
            .records
            .iter_mut()
            .rev()
            .find(|r| r.channel == *channel && r.is_open())?;
        record.resolved = true;
        record.resolution = Some(resolution);
        record.resolved_handle = resolved_handle;
        record.resolved_at = Some(now);
        Some(record.clone())
    }

    /// Records for one channel, or all records, oldest first
    pub fn list(&self, channel: Option<&ChannelName>) -> Vec<ForkRecord> {
        let state = self.state.lock();
        state
            .records
            .iter()
            .filter(|r| channel.map_or(true, |c| r.channel == *c))
            .cloned()
            .collect()
    }

    /// Number of unresolved forks on `channel`
    pub fn open_count(&self, channel: &ChannelName) -> usize {
        let state = self.state.lock();
        state
            .records
            .iter()
            .filter(|r| r.channel == *channel && r.is_open())
            .count()
    }
}
