//! Outcome reconciliation for one executed turn.
//!
//! The agent process is adversarial by accident: it may crash, get signaled,
//! rewrite history, or commit more than once. [`resolve_turn`] is the single
//! authoritative classification of what actually happened, derived from the
//! driver's raw status plus the repository's first-parent lineage, never from
//! the agent's free-form output. Every failure carries the transcript path so
//! a human can inspect what the agent actually did.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::core::outcome::parse_outcome;
use crate::core::types::CommitId;
use crate::io::driver::DriverStatus;
use crate::io::git::{Git, GitError};
use crate::io::turn_log;

/// Successful reconciliation: the single new commit and its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Agent-declared outcome from the commit trailer, if any.
    pub outcome: Option<String>,
    /// The one commit produced by this turn.
    pub commit_id: CommitId,
    /// The commit's full message.
    pub message: String,
}

/// Classified ways a turn can fail to produce its one commit.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "driver exited with code {exit_code}; review the transcript at {}",
        .transcript.display()
    )]
    DriverFailed { exit_code: i32, transcript: PathBuf },

    #[error(
        "driver was terminated by signal {signal}{}; review the transcript at {}",
        signal_suffix(.signal),
        .transcript.display()
    )]
    DriverSignaled { signal: i32, transcript: PathBuf },

    #[error(
        "no commits in the repository after execution (HEAD is unborn); transcript: {}",
        .transcript.display()
    )]
    UnbornHead { transcript: PathBuf },

    #[error(
        "no commit detected: HEAD is still {}; transcript: {}\nlast output:\n{tail}",
        .head.short(),
        .transcript.display()
    )]
    NoCommitDetected {
        head: CommitId,
        transcript: PathBuf,
        tail: String,
    },

    #[error(
        "HEAD moved from {} to {} but no first-parent ancestry path connects them \
         (orphan branch or rewritten history); transcript: {}",
        short_or_unborn(.head_before),
        .head_after.short(),
        .transcript.display()
    )]
    AncestryMismatch {
        head_before: Option<CommitId>,
        head_after: CommitId,
        transcript: PathBuf,
    },

    #[error(
        "expected exactly 1 commit, found {}:\n{}\ntranscript: {}",
        .summaries.len(),
        .summaries.join("\n"),
        .transcript.display()
    )]
    MultipleCommits {
        summaries: Vec<String>,
        transcript: PathBuf,
    },

    #[error(transparent)]
    Git(#[from] GitError),
}

impl ResolveError {
    /// Short variant label used for transcript ABORT markers.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::DriverFailed { .. } => "DriverFailed",
            ResolveError::DriverSignaled { .. } => "DriverSignaled",
            ResolveError::UnbornHead { .. } => "UnbornHead",
            ResolveError::NoCommitDetected { .. } => "NoCommitDetected",
            ResolveError::AncestryMismatch { .. } => "AncestryMismatch",
            ResolveError::MultipleCommits { .. } => "MultipleCommits",
            ResolveError::Git(_) => "Git",
        }
    }
}

/// Decide what one turn did to the repository.
///
/// Branches, in order, each terminal: driver failure, signal termination,
/// unborn HEAD, no movement, ancestry mismatch, multiple commits, and
/// finally the single-commit success path.
#[instrument(skip_all, fields(raw_status = status.raw()))]
pub fn resolve_turn(
    status: DriverStatus,
    head_before: Option<&CommitId>,
    transcript: &Path,
    git: &Git,
) -> Result<Resolution, ResolveError> {
    if let Some(signal) = status.signal() {
        warn!(signal, "driver terminated by signal");
        return Err(ResolveError::DriverSignaled {
            signal,
            transcript: transcript.to_path_buf(),
        });
    }
    if !status.success() {
        warn!(exit_code = status.raw(), "driver failed");
        return Err(ResolveError::DriverFailed {
            exit_code: status.raw(),
            transcript: transcript.to_path_buf(),
        });
    }

    let head_after = git.head()?;
    let Some(head_after) = head_after else {
        return Err(ResolveError::UnbornHead {
            transcript: transcript.to_path_buf(),
        });
    };

    if head_before == Some(&head_after) {
        warn!(head = head_after.short(), "no repository movement");
        return Err(ResolveError::NoCommitDetected {
            head: head_after,
            transcript: transcript.to_path_buf(),
            tail: turn_log::tail(transcript),
        });
    }

    let commits = git.commits_between(head_before, &head_after)?;
    match commits.as_slice() {
        [] => Err(ResolveError::AncestryMismatch {
            head_before: head_before.cloned(),
            head_after,
            transcript: transcript.to_path_buf(),
        }),
        [commit] => {
            let message = git.commit_message(commit)?;
            let outcome = parse_outcome(&message);
            debug!(commit = commit.short(), ?outcome, "turn resolved");
            Ok(Resolution {
                outcome,
                commit_id: commit.clone(),
                message,
            })
        }
        many => Err(ResolveError::MultipleCommits {
            summaries: many.iter().map(|c| summarize(git, c)).collect(),
            transcript: transcript.to_path_buf(),
        }),
    }
}

/// Per-commit summary for the multiple-commits report. A commit whose
/// message cannot be read must not abort the whole error report.
fn summarize(git: &Git, commit: &CommitId) -> String {
    git.commit_summary(commit)
        .unwrap_or_else(|_| format!("{}: (could not read)", commit.short()))
}

fn short_or_unborn(head: &Option<CommitId>) -> &str {
    head.as_ref().map_or("unborn", CommitId::short)
}

fn signal_suffix(signal: &i32) -> String {
    match signal_name(*signal) {
        Some(name) => format!(" ({name})"),
        None => String::new(),
    }
}

fn signal_name(signal: i32) -> Option<&'static str> {
    match signal {
        1 => Some("SIGHUP"),
        2 => Some("SIGINT"),
        3 => Some("SIGQUIT"),
        6 => Some("SIGABRT"),
        9 => Some("SIGKILL"),
        11 => Some("SIGSEGV"),
        13 => Some("SIGPIPE"),
        14 => Some("SIGALRM"),
        15 => Some("SIGTERM"),
        _ => None,
    }
}
