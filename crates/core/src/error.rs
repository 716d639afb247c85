//! Error taxonomy for the coordination core
//!
//! ## Error Codes (Canonical)
//!
//! | Code | Type | Retryable |
//! |------|------|-----------|
//! | LOCKED | [`LockError`] | after the lease expires or is released |
//! | CONFLICT | [`ConflictError`] | after re-reading the head, unless `fork` is set |
//! | NOT_FOUND | [`StoreError::NotFound`] | no |
//! | STORE_UNAVAILABLE | [`StoreError::Unavailable`] / [`StoreError::Io`] | yes |

use crate::clock::Millis;
use crate::types::{AgentId, Handle};
use thiserror::Error;

/// A channel is leased by another agent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("LOCKED: held by {holder} until {expires_at}")]
pub struct LockError {
    /// Agent holding the live lease
    pub holder: AgentId,
    /// When the lease lapses
    pub expires_at: Millis,
}

impl LockError {
    /// Canonical error code
    pub fn code(&self) -> &'static str {
        "LOCKED"
    }
}

/// A commit's expected version or predecessor did not match the live head
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "CONFLICT: expected version {your_version}, live version {current_version}{}",
    fork_suffix(.fork)
)]
pub struct ConflictError {
    /// Live version at rejection time
    pub current_version: u64,
    /// Live head at rejection time
    pub current_head: Option<Handle>,
    /// Version the writer expected
    pub your_version: u64,
    /// Set when the conflict was classified as a fork and logged
    pub fork: bool,
}

impl ConflictError {
    /// Canonical error code
    pub fn code(&self) -> &'static str {
        "CONFLICT"
    }

    /// Whether re-reading the head and retrying is appropriate
    ///
    /// Forks require an explicit resolution and are never retried blindly.
    pub fn is_retryable(&self) -> bool {
        !self.fork
    }
}

fn fork_suffix(fork: &bool) -> &'static str {
    if *fork {
        " (fork recorded)"
    } else {
        ""
    }
}

/// Rejection of a coordinator commit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// Channel is leased by someone else (or the token was wrong)
    #[error(transparent)]
    Locked(#[from] LockError),

    /// Version or predecessor mismatch
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

impl CommitError {
    /// Canonical error code
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::Locked(e) => e.code(),
            CommitError::Conflict(e) => e.code(),
        }
    }

    /// Whether the write protocol may retry after backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::Locked(_) => true,
            CommitError::Conflict(e) => e.is_retryable(),
        }
    }

    /// Whether this rejection recorded a fork
    pub fn is_fork(&self) -> bool {
        matches!(self, CommitError::Conflict(ConflictError { fork: true, .. }))
    }
}

/// Content store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// No blob exists for the handle (permanent)
    #[error("blob not found: {0}")]
    NotFound(Handle),

    /// Underlying I/O failed (transient)
    #[error("content store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store rejected or dropped the request (transient)
    #[error("content store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Canonical error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Io(_) | StoreError::Unavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Transient failures are absorbed by the write retry loop
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::NotFound(_))
    }
}
