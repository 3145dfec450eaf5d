//! Test-only helpers: throwaway git repositories and scripted drivers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::core::types::CommitId;
use crate::io::driver::{Driver, DriverStatus};
use crate::io::git::Git;

/// Temp-dir git repository with identity configured for committing.
pub struct TestRepo {
    dir: tempfile::TempDir,
    git: Git,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let git = Git::open(dir.path())?;
        git.init()?;
        let repo = Self { dir, git };
        repo.run_git(&["config", "user.email", "afk-tests@example.com"])?;
        repo.run_git(&["config", "user.name", "afk tests"])?;
        Ok(repo)
    }

    /// Temp directory that is not a repository at all.
    pub fn bare_dir() -> Result<tempfile::TempDir> {
        tempfile::tempdir().context("create tempdir")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Write a file, stage everything, and commit with the given message.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) -> Result<CommitId> {
        std::fs::write(self.path().join(name), contents).context("write file")?;
        self.run_git(&["add", "-A"])?;
        self.run_git(&["commit", "-m", message])?;
        self.head()
    }

    pub fn commit_empty(&self, message: &str) -> Result<CommitId> {
        self.run_git(&["commit", "--allow-empty", "-m", message])?;
        self.head()
    }

    /// Switch to a new orphan branch; the next commit becomes a second root.
    pub fn checkout_orphan(&self, branch: &str) -> Result<()> {
        self.run_git(&["checkout", "--orphan", branch])
    }

    pub fn head(&self) -> Result<CommitId> {
        self.git
            .head()?
            .ok_or_else(|| anyhow!("repository head is unborn"))
    }

    pub fn run_git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// One scripted driver step: observes the prompt and transcript path,
/// mutates the repository however the scenario requires, and reports a
/// status.
pub type DriverStep = Box<dyn FnMut(&str, &Path) -> Result<DriverStatus> + Send>;

/// Driver returning predetermined behavior without spawning processes.
pub struct ScriptedDriver {
    steps: Mutex<VecDeque<DriverStep>>,
    transcripts: Mutex<Vec<PathBuf>>,
}

impl ScriptedDriver {
    pub fn new(steps: Vec<DriverStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Step that touches nothing and exits with the given code.
    pub fn exit_step(code: i32) -> DriverStep {
        Box::new(move |_, _| Ok(DriverStatus::exited(code)))
    }

    /// Step reporting termination by the given signal.
    pub fn signal_step(signal: i32) -> DriverStep {
        Box::new(move |_, _| Ok(DriverStatus::signaled(signal)))
    }

    /// Transcript paths observed so far, in invocation order.
    pub fn transcripts(&self) -> Vec<PathBuf> {
        self.transcripts.lock().expect("lock transcripts").clone()
    }
}

impl Driver for ScriptedDriver {
    fn run(&self, prompt: &str, transcript: &Path) -> Result<DriverStatus> {
        self.transcripts
            .lock()
            .expect("lock transcripts")
            .push(transcript.to_path_buf());
        let mut step = self
            .steps
            .lock()
            .expect("lock steps")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted driver has no step left"))?;
        step(prompt, transcript)
    }
}
