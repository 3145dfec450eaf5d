//! Git adapter used as ground truth for turn outcomes.
//!
//! Turn classification never parses agent output; it inspects what actually
//! landed in the repository. We keep a small, explicit wrapper around `git`
//! subprocess calls so every query the resolver depends on is spelled out.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument, warn};

use crate::core::types::{CommitId, InvalidCommitId};

/// Errors from repository queries and mutations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("repo path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("unknown commit {id}: {detail}")]
    UnknownCommit { id: String, detail: String },

    #[error("no root commit found (history is empty)")]
    NoRootCommit,

    #[error("repository has {count} root commits; only single-root repositories are supported")]
    MultipleRoots { count: usize },

    #[error("tag already exists: {0}")]
    TagAlreadyExists(String),

    #[error("commit did not advance HEAD")]
    CommitDidNotAdvanceHead,

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to spawn git {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    MalformedCommitId(#[from] InvalidCommitId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Wrapper for executing git commands in one working tree.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    /// Open a working tree directory. The directory must exist; whether it
    /// is a repository is probed lazily by the queries that need one.
    pub fn open(workdir: impl Into<PathBuf>) -> Result<Self, GitError> {
        let workdir = workdir.into();
        if !workdir.is_dir() {
            return Err(GitError::NotADirectory(workdir));
        }
        Ok(Self { workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if the directory is inside a git repository.
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Current HEAD commit, or `None` for a valid repository whose branch is
    /// still unborn. A directory that is not a repository at all is an error,
    /// distinguished by probing the repository metadata directory rather than
    /// by exit code alone.
    #[instrument(skip_all)]
    pub fn head(&self) -> Result<Option<CommitId>, GitError> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if out.status.success() {
            let hex = String::from_utf8_lossy(&out.stdout).trim().to_string();
            return Ok(Some(CommitId::new(hex)?));
        }
        if self.is_repo() {
            debug!("valid repository with unborn HEAD");
            return Ok(None);
        }
        warn!(workdir = %self.workdir.display(), "not a git repository");
        Err(GitError::NotARepository(self.workdir.clone()))
    }

    /// Full commit message: subject, body, and trailers.
    pub fn commit_message(&self, id: &CommitId) -> Result<String, GitError> {
        self.show_commit(id, "%B")
    }

    /// `"{7-char-short-id}: {subject-line}"`, for human-facing error text.
    pub fn commit_summary(&self, id: &CommitId) -> Result<String, GitError> {
        self.show_commit(id, "%h: %s")
    }

    fn show_commit(&self, id: &CommitId, format: &str) -> Result<String, GitError> {
        let format_arg = format!("--format={format}");
        match self.run_capture(&["log", "-1", &format_arg, id.as_str(), "--"]) {
            Ok(out) => Ok(out),
            Err(GitError::CommandFailed { stderr, .. }) => Err(GitError::UnknownCommit {
                id: id.to_string(),
                detail: stderr,
            }),
            Err(err) => Err(err),
        }
    }

    /// The repository's unique root commit reachable from HEAD.
    pub fn root_commit(&self) -> Result<CommitId, GitError> {
        let out = self.run_capture(&["rev-list", "--max-parents=0", "HEAD"])?;
        let roots: Vec<&str> = out.lines().filter(|l| !l.is_empty()).collect();
        match roots.as_slice() {
            [] => Err(GitError::NoRootCommit),
            [root] => Ok(CommitId::new(*root)?),
            many => Err(GitError::MultipleRoots { count: many.len() }),
        }
    }

    /// Commits from `since` (exclusive) to `until` (inclusive), oldest first,
    /// restricted to the first-parent ancestry path between the two points.
    ///
    /// With `since` absent the range starts at the repository's unique root
    /// commit, which is included explicitly since `A..B` syntax excludes it.
    /// Merge-branch history is never traversed; an `until` that is not a
    /// first-parent descendant of `since` yields an empty range.
    #[instrument(skip_all)]
    pub fn commits_between(
        &self,
        since: Option<&CommitId>,
        until: &CommitId,
    ) -> Result<Vec<CommitId>, GitError> {
        match since {
            Some(since) => self.ancestry_path(since, until),
            None => {
                let root = self.root_commit()?;
                let mut commits = vec![root.clone()];
                commits.extend(self.ancestry_path(&root, until)?);
                Ok(commits)
            }
        }
    }

    fn ancestry_path(&self, since: &CommitId, until: &CommitId) -> Result<Vec<CommitId>, GitError> {
        let range = format!("{since}..{until}");
        let out = self.run_capture(&[
            "log",
            "--reverse",
            "--format=%H",
            "--ancestry-path",
            "--first-parent",
            &range,
            "--",
        ])?;
        out.lines()
            .filter(|line| !line.is_empty())
            .map(|line| CommitId::new(line).map_err(GitError::from))
            .collect()
    }

    /// Check if a lightweight tag with the given name exists.
    pub fn tag_exists(&self, name: &str) -> Result<bool, GitError> {
        let out = self.run_capture(&["tag", "-l", name])?;
        Ok(!out.trim().is_empty())
    }

    /// Create a lightweight tag pointing at the given commit.
    ///
    /// Pre-checked, not race-tolerant: fails if the tag already exists.
    #[instrument(skip_all, fields(tag = name))]
    pub fn create_tag(&self, name: &str, id: &CommitId) -> Result<(), GitError> {
        if self.tag_exists(name)? {
            warn!(tag = name, "refusing to overwrite existing tag");
            return Err(GitError::TagAlreadyExists(name.to_string()));
        }
        self.run_checked(&["tag", name, id.as_str()])?;
        Ok(())
    }

    /// True iff the directory holds nothing besides the `.git` metadata dir.
    pub fn is_empty_dir(&self) -> Result<bool, GitError> {
        for entry in std::fs::read_dir(&self.workdir)? {
            let entry = entry?;
            if entry.file_name() != ".git" {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Initialize a new repository in the working directory.
    pub fn init(&self) -> Result<(), GitError> {
        debug!(workdir = %self.workdir.display(), "initializing repository");
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Create an empty commit and return its id.
    ///
    /// The commit is authored by the orchestrator itself, so it succeeds in
    /// freshly-initialized environments with no user-level git identity.
    pub fn commit_empty(&self, message: &str) -> Result<CommitId, GitError> {
        self.run_checked(&[
            "-c",
            "user.name=afk",
            "-c",
            "user.email=afk@localhost",
            "commit",
            "--allow-empty",
            "-m",
            message,
        ])?;
        self.head()?.ok_or(GitError::CommitDidNotAdvanceHead)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr,
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| GitError::Spawn {
                command: args.join(" "),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_missing_directory() {
        let err = Git::open("/definitely/not/a/real/directory").unwrap_err();
        assert!(matches!(err, GitError::NotADirectory(_)));
    }

    #[test]
    fn head_fails_outside_a_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::open(temp.path()).expect("open");
        let err = git.head().unwrap_err();
        assert!(matches!(err, GitError::NotARepository(_)));
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn head_is_none_for_unborn_branch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::open(temp.path()).expect("open");
        git.init().expect("init");
        assert_eq!(git.head().expect("head"), None);
    }

    #[test]
    fn empty_dir_check_ignores_git_metadata() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::open(temp.path()).expect("open");
        git.init().expect("init");
        assert!(git.is_empty_dir().expect("empty"));

        std::fs::write(temp.path().join("file.txt"), "x").expect("write");
        assert!(!git.is_empty_dir().expect("empty"));
    }
}
