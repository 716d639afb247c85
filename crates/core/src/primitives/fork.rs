//! Fork records for divergent channel histories
//!
//! A fork is recorded when a commit presents the live version as its expected
//! version but claims a different predecessor than the live head: two writers
//! believed they extended the same point in history from different states.
//! Forks never block writes; they are kept until explicitly resolved.

use crate::clock::Millis;
use crate::types::{AgentId, ChannelName, Handle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One side of a fork
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Head handle of this branch (`None` for the empty root)
    pub handle: Option<Handle>,
    /// Version this branch sits at
    pub version: u64,
}

/// How a fork was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the committed branch
    KeepA,
    /// Keep the rejected branch
    KeepB,
    /// Combine both branches into a merge record
    Merge,
}

impl Resolution {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::KeepA => "keep_a",
            Resolution::KeepB => "keep_b",
            Resolution::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_a" => Ok(Resolution::KeepA),
            "keep_b" => Ok(Resolution::KeepB),
            "merge" => Ok(Resolution::Merge),
            other => Err(format!("unknown fork resolution: {}", other)),
        }
    }
}

/// A detected divergence in a channel's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkRecord {
    /// Ledger-assigned identifier, unique per coordinator
    pub id: u64,
    /// Channel that forked
    pub channel: ChannelName,
    /// The live head at detection time
    pub branch_a: Branch,
    /// The rejected commit's claimed state
    pub branch_b: Branch,
    /// Predecessor the rejected commit claimed to extend
    pub claimed_prev: Option<Handle>,
    /// Agent whose commit triggered detection
    pub detected_by: AgentId,
    /// Detection time
    pub detected_at: Millis,
    /// Whether an explicit resolution was applied
    pub resolved: bool,
    /// Applied resolution
    pub resolution: Option<Resolution>,
    /// Head installed by the resolution, if any
    pub resolved_handle: Option<Handle>,
    /// Resolution time
    pub resolved_at: Option<Millis>,
}

impl ForkRecord {
    /// Whether the fork still awaits review
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}
