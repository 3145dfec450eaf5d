//! Shared value types for turn tracking.
//!
//! These types define the stable contracts between the repository inspector,
//! the turn state machine, and the session history. They are pure data: all
//! normalization happens at construction time and construction fails on
//! invalid input rather than storing an inconsistent value.

use std::fmt;
use std::path::PathBuf;

use jiff::Timestamp;
use serde::Serialize;

use crate::core::transition::TransitionKind;

/// Turn numbers are bounded so formatted identifiers stay fixed-width
/// (`turn-00001-coding.log`).
pub const MAX_TURN_NUMBER: u32 = 99_999;

/// The string handed back by git was not a 40- or 64-char hex digest.
#[derive(Debug, thiserror::Error)]
#[error("malformed commit id from repository backend: {0:?}")]
pub struct InvalidCommitId(pub String);

/// Opaque content address of a commit. Produced only from repository output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(hex: impl Into<String>) -> Result<Self, InvalidCommitId> {
        let hex = hex.into();
        let len_ok = hex.len() == 40 || hex.len() == 64;
        if !len_ok || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidCommitId(hex));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 7-char abbreviation for human-facing messages.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The turn number was zero or over [`MAX_TURN_NUMBER`].
#[derive(Debug, thiserror::Error)]
#[error("turn number must be between 1 and {MAX_TURN_NUMBER}, got {0}")]
pub struct InvalidTurnNumber(pub u32);

/// Positive, bounded sequence number of a turn within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TurnNumber(u32);

impl TurnNumber {
    pub fn new(n: u32) -> Result<Self, InvalidTurnNumber> {
        if n == 0 || n > MAX_TURN_NUMBER {
            return Err(InvalidTurnNumber(n));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TurnNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The transcript path stored on a record must be absolute.
#[derive(Debug, thiserror::Error)]
#[error("transcript path must be absolute, got {}", .0.display())]
pub struct RelativeTranscriptPath(pub PathBuf);

/// Immutable record of one successfully completed turn.
///
/// Created only by `Turn::finish` after the resolver has confirmed exactly
/// one new commit; never mutated afterwards. The commit itself lives in the
/// repository, the record only references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRecord {
    turn_number: TurnNumber,
    transition_kind: TransitionKind,
    outcome: Option<String>,
    message: String,
    commit_id: CommitId,
    transcript_path: PathBuf,
    timestamp: Timestamp,
}

impl TurnRecord {
    pub fn new(
        turn_number: TurnNumber,
        transition_kind: TransitionKind,
        outcome: Option<String>,
        message: String,
        commit_id: CommitId,
        transcript_path: PathBuf,
        timestamp: Timestamp,
    ) -> Result<Self, RelativeTranscriptPath> {
        if !transcript_path.is_absolute() {
            return Err(RelativeTranscriptPath(transcript_path));
        }
        Ok(Self {
            turn_number,
            transition_kind,
            outcome,
            message,
            commit_id,
            transcript_path,
            timestamp,
        })
    }

    pub fn turn_number(&self) -> TurnNumber {
        self.turn_number
    }

    pub fn transition_kind(&self) -> &TransitionKind {
        &self.transition_kind
    }

    /// Agent-declared outcome from the commit trailer, if any was declared.
    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn commit_id(&self) -> &CommitId {
        &self.commit_id
    }

    pub fn transcript_path(&self) -> &std::path::Path {
        &self.transcript_path
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}
