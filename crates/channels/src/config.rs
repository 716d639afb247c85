//! Channel log configuration and retry backoff

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// When threshold-triggered snapshots run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// On the writing thread, after the commit
    Inline,
    /// On a detached thread
    Background,
}

/// Tunables for the coordinated write protocol, snapshots and recovery
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelLogConfig {
    /// Total attempts a write makes before giving up
    pub max_write_retries: u32,
    /// First backoff delay
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_backoff_ms: u64,
    /// Snapshot every N entries; 0 disables automatic snapshots
    pub snapshot_threshold: u64,
    /// Where automatic snapshots run
    pub snapshot_mode: SnapshotMode,
    /// Newest entries kept in memory per channel
    pub tail_cache_limit: usize,
    /// Walk bound used by `recover` when none is given
    pub default_recovery_depth: usize,
}

impl ChannelLogConfig {
    /// Set the attempt budget
    pub fn max_write_retries(mut self, attempts: u32) -> Self {
        self.max_write_retries = attempts;
        self
    }

    /// Set the backoff bounds
    pub fn backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.base_backoff_ms = base;
        self.max_backoff_ms = max;
        self
    }

    /// Set the automatic snapshot interval
    pub fn snapshot_threshold(mut self, every: u64) -> Self {
        self.snapshot_threshold = every;
        self
    }

    /// Set where automatic snapshots run
    pub fn snapshot_mode(mut self, mode: SnapshotMode) -> Self {
        self.snapshot_mode = mode;
        self
    }

    /// Set the per-channel tail cache bound
    pub fn tail_cache_limit(mut self, limit: usize) -> Self {
        self.tail_cache_limit = limit;
        self
    }

    /// Attempts a write actually makes (at least one)
    pub fn attempts(&self) -> u32 {
        self.max_write_retries.max(1)
    }
}

impl Default for ChannelLogConfig {
    fn default() -> Self {
        Self {
            max_write_retries: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 1_000,
            snapshot_threshold: 100,
            snapshot_mode: SnapshotMode::Background,
            tail_cache_limit: 10_000,
            default_recovery_depth: 10_000,
        }
    }
}

/// Exponential backoff with up to 25% random jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh schedule
    pub fn new(config: &ChannelLogConfig) -> Self {
        Self {
            base_ms: config.base_backoff_ms,
            max_ms: config.max_backoff_ms.max(config.base_backoff_ms),
            attempt: 0,
        }
    }

    /// Delay before the next attempt, without jitter
    pub fn nominal(&self) -> u64 {
        let factor = 1u64.checked_shl(self.attempt.min(32)).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Delay before the next attempt; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal();
        self.attempt = self.attempt.saturating_add(1);
        let jitter = if nominal >= 4 {
            rand::thread_rng().gen_range(0..=nominal / 4)
        } else {
            0
        };
        Duration::from_millis(nominal.saturating_add(jitter).min(self.max_ms))
    }

    /// Sleep for the next delay
    pub fn wait(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}
