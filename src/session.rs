//! Session façade: sequencing, tagging, and turn history.
//!
//! A [`Session`] drives turns end-to-end against one working directory and
//! keeps the append-only history of what succeeded. Turn numbers strictly
//! increase and are never reused, even when a turn fails; a failed
//! `execute_turn` leaves the history untouched, so retrying is always safe
//! from the session's point of view.
//!
//! Each session leaves a lightweight audit trail of tags:
//! `afk-{name}-0` marks the starting commit, `afk-{name}-{n}` the commit
//! produced by turn `n`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::transition::TransitionKind;
use crate::core::types::{CommitId, InvalidTurnNumber, MAX_TURN_NUMBER, TurnNumber, TurnRecord};
use crate::io::driver::Driver;
use crate::io::git::{Git, GitError};
use crate::io::turn_log::TurnLog;
use crate::resolve::{ResolveError, resolve_turn};
use crate::turn::{Turn, TurnError};

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,32}$").expect("static pattern compiles"));

/// Errors from session construction and turn sequencing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session root must be an absolute path to an existing directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error(
        "directory is not empty and not a git repository; refusing to adopt it: {}",
        .0.display()
    )]
    NotEmptyNotARepo(PathBuf),

    #[error("session name must match ^[A-Za-z0-9_]{{1,32}}$, got {0:?}")]
    InvalidSessionName(String),

    #[error("resume turn number must be between 1 and {MAX_TURN_NUMBER}, got {0}")]
    InvalidResumePoint(u32),

    #[error("cannot resume session: starting-point tag {0} does not exist")]
    ResumeWithoutOrigin(String),

    #[error("tag {0} already exists; refusing to run a turn that would collide with it")]
    TagCollision(String),

    #[error("turn numbers must strictly increase: last recorded {last}, got {got}")]
    NonMonotonicTurn { last: u32, got: u32 },

    #[error("no turn with number {0}")]
    NotFound(u32),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    BadTurnNumber(#[from] InvalidTurnNumber),
}

impl SessionError {
    /// Short variant label used for transcript ABORT markers.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidRoot(_) => "InvalidRoot",
            SessionError::NotEmptyNotARepo(_) => "NotEmptyNotARepo",
            SessionError::InvalidSessionName(_) => "InvalidSessionName",
            SessionError::InvalidResumePoint(_) => "InvalidResumePoint",
            SessionError::ResumeWithoutOrigin(_) => "ResumeWithoutOrigin",
            SessionError::TagCollision(_) => "TagCollision",
            SessionError::NonMonotonicTurn { .. } => "NonMonotonicTurn",
            SessionError::NotFound(_) => "NotFound",
            SessionError::Turn(_) => "Turn",
            SessionError::Resolve(err) => err.kind(),
            SessionError::Git(_) => "Git",
            SessionError::BadTurnNumber(_) => "InvalidTurnNumber",
        }
    }
}

/// Ordered collection of completed turns for one working directory.
pub struct Session<D: Driver> {
    root: PathBuf,
    name: String,
    git: Git,
    driver: D,
    next_turn: u32,
    turns: Vec<TurnRecord>,
}

impl<D: Driver> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("name", &self.name)
            .field("next_turn", &self.next_turn)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Session<D> {
    /// Start a fresh session, establishing and tagging its starting commit.
    ///
    /// A valid repository is adopted as-is (its HEAD becomes turn 0; an
    /// unborn branch gets an empty root commit first). An empty non-repo
    /// directory is initialized. A non-empty non-repo directory is rejected:
    /// arbitrary existing files are never silently adopted as an origin.
    pub fn create(root: PathBuf, driver: D, name: &str) -> Result<Self, SessionError> {
        let name = validate_name(name)?;
        let git = open_root(&root)?;
        let origin = bootstrap(&git, &root)?;
        info!(session = %name, origin = origin.short(), "session created");
        let session = Self {
            root,
            name,
            git,
            driver,
            next_turn: 1,
            turns: Vec::new(),
        };
        session.git.create_tag(&session.tag_name(0), &origin)?;
        Ok(session)
    }

    /// Resume an interrupted session at a known turn number.
    ///
    /// Resuming is deliberately a distinct entry point: a fresh session
    /// always starts at turn 1, and an arbitrary first number is never
    /// silently accepted. The starting-point tag from `create` must already
    /// exist; turn-0 bootstrapping is not repeated here.
    pub fn resume_at(
        root: PathBuf,
        driver: D,
        name: &str,
        first_turn: u32,
    ) -> Result<Self, SessionError> {
        let name = validate_name(name)?;
        if first_turn == 0 || first_turn > MAX_TURN_NUMBER {
            return Err(SessionError::InvalidResumePoint(first_turn));
        }
        let git = open_root(&root)?;
        let origin_tag = format!("afk-{name}-0");
        if !git.tag_exists(&origin_tag)? {
            return Err(SessionError::ResumeWithoutOrigin(origin_tag));
        }
        info!(session = %name, first_turn, "session resumed");
        Ok(Self {
            root,
            name,
            git,
            driver,
            next_turn: first_turn,
            turns: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding turn transcripts.
    pub fn log_dir(&self) -> PathBuf {
        TurnLog::log_dir(&self.root)
    }

    /// Run one turn end-to-end and record it.
    ///
    /// Allocates the next sequence number, fails fast on a tag collision
    /// before any repository mutation, then starts the turn, runs the
    /// driver, resolves the outcome against the repository, finishes the
    /// turn, tags the commit, and appends the record. On any failure the
    /// turn is aborted (transcript annotated) and the error propagates with
    /// no partial record. Tag creation and record append are not atomic: a
    /// crash between the two leaves a tag the next call fails loudly on.
    #[instrument(skip_all, fields(session = %self.name, kind = %kind))]
    pub fn execute_turn(
        &mut self,
        prompt: &str,
        kind: TransitionKind,
    ) -> Result<TurnRecord, SessionError> {
        let number = self.allocate_turn_number()?;
        let tag = self.tag_name(number.get());
        if self.git.tag_exists(&tag)? {
            return Err(SessionError::TagCollision(tag));
        }

        let mut turn = Turn::new();
        turn.start(number, kind, &self.root, &self.git)?;

        match self.drive(&mut turn, prompt) {
            Ok(record) => {
                self.git.create_tag(&tag, record.commit_id())?;
                self.add_turn(record.clone())?;
                info!(
                    turn = number.get(),
                    commit = record.commit_id().short(),
                    outcome = record.outcome().unwrap_or("none"),
                    "turn recorded"
                );
                Ok(record)
            }
            Err(err) => {
                // Annotation only; the original error propagates unchanged.
                if let Err(abort_err) = turn.abort(err.kind(), &err.to_string()) {
                    warn!(error = %abort_err, "could not annotate transcript on abort");
                }
                Err(err)
            }
        }
    }

    fn drive(&self, turn: &mut Turn, prompt: &str) -> Result<TurnRecord, SessionError> {
        let status = turn.execute(&self.driver, prompt)?;
        let head_before = turn.head_before()?.cloned();
        let transcript = turn.transcript_path()?.to_path_buf();
        let resolution = resolve_turn(status, head_before.as_ref(), &transcript, &self.git)?;
        let record = turn.finish(resolution.outcome, resolution.commit_id, resolution.message)?;
        Ok(record)
    }

    /// Append a completed record. Turn numbers must strictly increase.
    pub fn add_turn(&mut self, record: TurnRecord) -> Result<(), SessionError> {
        if let Some(last) = self.turns.last() {
            let last_n = last.turn_number().get();
            if record.turn_number().get() <= last_n {
                return Err(SessionError::NonMonotonicTurn {
                    last: last_n,
                    got: record.turn_number().get(),
                });
            }
        }
        self.turns.push(record);
        Ok(())
    }

    /// Look up a recorded turn by number.
    pub fn turn(&self, n: u32) -> Result<&TurnRecord, SessionError> {
        let mut prev = 0;
        for record in &self.turns {
            let num = record.turn_number().get();
            debug_assert!(num > prev, "turn history not monotonic");
            if num == n {
                return Ok(record);
            }
            if num > n {
                break;
            }
            prev = num;
        }
        Err(SessionError::NotFound(n))
    }

    /// Recorded turns in chronological order.
    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn tag_name(&self, n: u32) -> String {
        format!("afk-{}-{}", self.name, n)
    }

    fn allocate_turn_number(&mut self) -> Result<TurnNumber, SessionError> {
        let number = TurnNumber::new(self.next_turn)?;
        // Allocated exactly once; never reused even if this turn fails.
        self.next_turn += 1;
        debug!(turn = number.get(), "allocated turn number");
        Ok(number)
    }
}

fn validate_name(name: &str) -> Result<String, SessionError> {
    if !NAME_PATTERN.is_match(name) {
        return Err(SessionError::InvalidSessionName(name.to_string()));
    }
    Ok(name.to_string())
}

fn open_root(root: &Path) -> Result<Git, SessionError> {
    if !root.is_absolute() || !root.is_dir() {
        return Err(SessionError::InvalidRoot(root.to_path_buf()));
    }
    Ok(Git::open(root)?)
}

/// Establish the session's starting commit.
fn bootstrap(git: &Git, root: &Path) -> Result<CommitId, SessionError> {
    if git.is_repo() {
        match git.head()? {
            Some(head) => Ok(head),
            None => Ok(git.commit_empty("afk: session start")?),
        }
    } else if git.is_empty_dir()? {
        debug!(root = %root.display(), "initializing empty directory");
        git.init()?;
        Ok(git.commit_empty("afk: session start")?)
    } else {
        Err(SessionError::NotEmptyNotARepo(root.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_names_are_constrained() {
        for name in ["main", "Run_2", "a", "x".repeat(32).as_str()] {
            assert!(validate_name(name).is_ok(), "rejected {name:?}");
        }
        for name in ["", "has space", "dash-ed", "dot.ted", "x".repeat(33).as_str()] {
            assert!(validate_name(name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn relative_root_is_rejected() {
        let err = open_root(Path::new("relative/dir")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidRoot(_)));
    }
}
