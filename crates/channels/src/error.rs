//! Channel layer errors

use relay_core::{ChannelName, CommitError, LockError, StoreError};
use thiserror::Error;

/// Failures of channel log and directory operations
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Coordinator rejected a lock or commit
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// Content store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored blob could not be decoded or failed verification
    #[error("decode error: {0}")]
    Decode(String),

    /// A value could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// No manifest exists for the channel
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelName),

    /// A manifest already exists for the channel
    #[error("channel already exists: {0}")]
    ChannelExists(ChannelName),

    /// The write protocol gave up
    #[error("write to {channel} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Channel written
        channel: ChannelName,
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: Box<ChannelError>,
    },
}

impl ChannelError {
    /// Whether the write loop should back off and try again
    pub fn is_retryable(&self) -> bool {
        match self {
            ChannelError::Commit(e) => e.is_retryable(),
            ChannelError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this error carries a recorded fork
    pub fn is_fork(&self) -> bool {
        match self {
            ChannelError::Commit(e) => e.is_fork(),
            ChannelError::RetriesExhausted { last, .. } => last.is_fork(),
            _ => false,
        }
    }
}

impl From<LockError> for ChannelError {
    fn from(e: LockError) -> Self {
        ChannelError::Commit(CommitError::Locked(e))
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            ChannelError::Decode(e.to_string())
        } else {
            ChannelError::Encode(e.to_string())
        }
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
