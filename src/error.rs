//! Unified error types for relay.
//!
//! This module flattens the errors of the layer crates into one stable,
//! user-facing enum.

use relay_channels::ChannelError;
use relay_core::{AgentId, ChannelName, CommitError, ConflictError, Handle, LockError, Millis, StoreError};
use thiserror::Error;

/// All relay errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel is leased by another agent
    #[error("LOCKED: held by {holder} until {expires_at}")]
    Locked {
        /// Current lease holder
        holder: AgentId,
        /// Lease expiry
        expires_at: Millis,
    },

    /// Stale expected version
    #[error("CONFLICT: channel is at version {current_version}, write expected {your_version}")]
    Conflict {
        /// Live version
        current_version: u64,
        /// Live head handle
        current_head: Option<Handle>,
        /// Version the writer read
        your_version: u64,
    },

    /// Divergent history, recorded in the fork ledger
    #[error("CONFLICT: fork at version {current_version}, resolve before retrying")]
    Fork {
        /// Live version
        current_version: u64,
        /// Live head handle
        current_head: Option<Handle>,
        /// Version the writer read
        your_version: u64,
    },

    /// Unknown channel or blob
    #[error("not found: {0}")]
    NotFound(String),

    /// Channel already registered
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Content store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Record or snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A write gave up after its attempt budget
    #[error("write to {channel} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Channel written
        channel: ChannelName,
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: Box<Error>,
    },

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Locked { .. } => "LOCKED",
            Error::Conflict { .. } | Error::Fork { .. } => "CONFLICT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::Storage(_) => "STORAGE",
            Error::Serialization(_) => "SERIALIZATION",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::Config(_) => "CONFIG",
            Error::Io(_) => "IO",
        }
    }

    /// Check if this error is retryable.
    ///
    /// Lease contention and stale versions may succeed after a re-read.
    /// Forks need an explicit resolution first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Locked { .. } | Error::Conflict { .. })
    }

    /// Check if this is a conflict error, fork or not.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::Fork { .. })
    }

    /// Check if this error reports a fork.
    pub fn is_fork(&self) -> bool {
        match self {
            Error::Fork { .. } => true,
            Error::RetriesExhausted { last, .. } => last.is_fork(),
            _ => false,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        Error::Locked {
            holder: e.holder,
            expires_at: e.expires_at,
        }
    }
}

impl From<ConflictError> for Error {
    fn from(e: ConflictError) -> Self {
        let ConflictError {
            current_version,
            current_head,
            your_version,
            fork,
        } = e;
        if fork {
            Error::Fork {
                current_version,
                current_head,
                your_version,
            }
        } else {
            Error::Conflict {
                current_version,
                current_head,
                your_version,
            }
        }
    }
}

impl From<CommitError> for Error {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Locked(e) => e.into(),
            CommitError::Conflict(e) => e.into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(handle) => Error::NotFound(format!("blob {}", handle)),
            StoreError::Io(e) => Error::Io(e),
            StoreError::Unavailable(msg) => Error::Storage(msg),
        }
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Commit(e) => e.into(),
            ChannelError::Store(e) => e.into(),
            ChannelError::Decode(msg) | ChannelError::Encode(msg) => Error::Serialization(msg),
            ChannelError::UnknownChannel(name) => Error::NotFound(format!("channel {}", name)),
            ChannelError::ChannelExists(name) => Error::AlreadyExists(format!("channel {}", name)),
            ChannelError::RetriesExhausted {
                channel,
                attempts,
                last,
            } => Error::RetriesExhausted {
                channel,
                attempts,
                last: Box::new((*last).into()),
            },
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
