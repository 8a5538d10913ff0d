//! Vote values and the transition rule shared by the server's vote engine
//! and the client's optimistic updater.
//!
//! A stored vote is one of `-1`, `0` or `+1`. Zero means the user voted once
//! and then retracted; the row is kept so later revotes update it in place.
//! Every transition moves a post's points by `new_stored - previous_effective`,
//! where the effective value of "never voted" is 0.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A vote a user can request. Retraction is not requested directly: it
/// happens when the same value is cast twice in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum VoteValue {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vote value must be 1 or -1, got {0}")]
pub struct InvalidVoteValue(pub i32);

impl VoteValue {
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl TryFrom<i32> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl From<VoteValue> for i32 {
    fn from(value: VoteValue) -> Self {
        value.as_i32()
    }
}

/// What happens to the ledger row for a (user, post) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    /// No row yet: insert one.
    Insert,
    /// Same value cast twice: set the row to 0.
    Retract,
    /// Different value (or a previously retracted row): overwrite.
    Change,
}

/// Outcome of applying a requested vote to the previous stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub action: LedgerAction,
    /// Value the ledger row holds afterwards.
    pub stored: i32,
    /// Amount to add to the post's points.
    pub delta: i32,
}

impl VoteTransition {
    /// Resolve a requested vote against the previously stored value, if any.
    pub fn resolve(previous: Option<i32>, requested: VoteValue) -> Self {
        let requested = requested.as_i32();
        let (action, stored) = match previous {
            None => (LedgerAction::Insert, requested),
            Some(prev) if prev == requested => (LedgerAction::Retract, 0),
            Some(_) => (LedgerAction::Change, requested),
        };

        Self {
            action,
            stored,
            delta: stored - effective_value(previous),
        }
    }
}

/// The value a stored vote contributes to a post's points.
pub fn effective_value(stored: Option<i32>) -> i32 {
    stored.unwrap_or(0)
}
