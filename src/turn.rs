//! Single-use turn state machine.
//!
//! A [`Turn`] wraps exactly one agent invocation:
//! `Initial -> InProgress -> {Finished, Aborted}`. Terminal states are
//! absorbing and every misuse is a loud [`TurnError::InvalidState`], never a
//! silent no-op. The pre-turn head snapshot, the transcript, and the turn
//! number are all populated atomically by [`Turn::start`] so a failed
//! construction leaks nothing.

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use tracing::{debug, instrument};

use crate::core::transition::TransitionKind;
use crate::core::types::{CommitId, RelativeTranscriptPath, TurnNumber, TurnRecord};
use crate::io::driver::{Driver, DriverStatus};
use crate::io::git::{Git, GitError};
use crate::io::turn_log::TurnLog;

/// Errors from turn lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("turn is {actual}; operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("transcript {}: {source}", .path.display())]
    Transcript {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("driver invocation failed: {0:#}")]
    Driver(anyhow::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Record(#[from] RelativeTranscriptPath),
}

struct InProgress {
    number: TurnNumber,
    kind: TransitionKind,
    head_before: Option<CommitId>,
    transcript: TurnLog,
    started_at: Timestamp,
}

enum State {
    Initial,
    InProgress(Box<InProgress>),
    Finished,
    Aborted,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Initial => "Initial",
            State::InProgress(_) => "InProgress",
            State::Finished => "Finished",
            State::Aborted => "Aborted",
        }
    }
}

/// One attempt at a turn. Used exactly once, then discarded.
pub struct Turn {
    state: State,
}

impl Default for Turn {
    fn default() -> Self {
        Self::new()
    }
}

impl Turn {
    pub fn new() -> Self {
        Self {
            state: State::Initial,
        }
    }

    fn in_progress(&self, expected: &'static str) -> Result<&InProgress, TurnError> {
        match &self.state {
            State::InProgress(data) => Ok(data),
            other => Err(TurnError::InvalidState {
                expected,
                actual: other.name(),
            }),
        }
    }

    /// Snapshot the repository head, create the transcript with its START
    /// marker, and move to `InProgress`.
    #[instrument(skip_all, fields(turn = number.get(), kind = %kind))]
    pub fn start(
        &mut self,
        number: TurnNumber,
        kind: TransitionKind,
        session_root: &Path,
        git: &Git,
    ) -> Result<(), TurnError> {
        if !matches!(self.state, State::Initial) {
            return Err(TurnError::InvalidState {
                expected: "Initial",
                actual: self.state.name(),
            });
        }
        let head_before = git.head()?;
        let transcript =
            TurnLog::create(session_root, number, &kind).map_err(|source| TurnError::Transcript {
                path: TurnLog::log_dir(session_root).join(TurnLog::filename(number, &kind)),
                source,
            })?;
        debug!(head_before = ?head_before.as_ref().map(CommitId::short), "turn started");
        self.state = State::InProgress(Box::new(InProgress {
            number,
            kind,
            head_before,
            transcript,
            started_at: Timestamp::now(),
        }));
        Ok(())
    }

    /// Delegate to the driver and hand back its raw status uninterpreted.
    /// Blocks for the duration of the agent process.
    pub fn execute<D: Driver>(&self, driver: &D, prompt: &str) -> Result<DriverStatus, TurnError> {
        let data = self.in_progress("InProgress")?;
        driver
            .run(prompt, data.transcript.path())
            .map_err(TurnError::Driver)
    }

    /// Head captured at `start`, `None` for a then-unborn branch.
    pub fn head_before(&self) -> Result<Option<&CommitId>, TurnError> {
        Ok(self.in_progress("InProgress")?.head_before.as_ref())
    }

    pub fn transcript_path(&self) -> Result<&Path, TurnError> {
        Ok(self.in_progress("InProgress")?.transcript.path())
    }

    /// Append the END marker and materialize the immutable record.
    pub fn finish(
        &mut self,
        outcome: Option<String>,
        commit_id: CommitId,
        message: String,
    ) -> Result<TurnRecord, TurnError> {
        let data = match std::mem::replace(&mut self.state, State::Finished) {
            State::InProgress(data) => data,
            other => {
                let actual = other.name();
                self.state = other;
                return Err(TurnError::InvalidState {
                    expected: "InProgress",
                    actual,
                });
            }
        };
        let label = outcome.as_deref().unwrap_or("none");
        data.transcript
            .append(&format!("=== Turn {} END: {label} ===", data.number))
            .map_err(|source| TurnError::Transcript {
                path: data.transcript.path().to_path_buf(),
                source,
            })?;
        let record = TurnRecord::new(
            data.number,
            data.kind,
            outcome,
            message,
            commit_id,
            data.transcript.path().to_path_buf(),
            data.started_at,
        )?;
        Ok(record)
    }

    /// Annotate the transcript with the failure and move to `Aborted`.
    ///
    /// Best-effort: a transcript-write failure is swallowed so it can never
    /// mask the original error, which the caller still owns and re-raises.
    pub fn abort(&mut self, error_kind: &str, detail: &str) -> Result<(), TurnError> {
        let data = match std::mem::replace(&mut self.state, State::Aborted) {
            State::InProgress(data) => data,
            other => {
                let actual = other.name();
                self.state = other;
                return Err(TurnError::InvalidState {
                    expected: "InProgress",
                    actual,
                });
            }
        };
        let _ = data
            .transcript
            .append(&format!("=== Turn {} ABORT: {error_kind} ===", data.number));
        let _ = data.transcript.append(detail);
        Ok(())
    }
}
