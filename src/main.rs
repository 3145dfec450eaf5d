//! Git-verified autonomous coding turn orchestrator.
//!
//! Thin CLI over the library: `afk turn` runs one agent turn against a
//! session working directory, `afk status` reports where a session stands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use afk::core::transition::TransitionKind;
use afk::io::driver::ClaudeDriver;
use afk::io::git::Git;
use afk::session::Session;

#[derive(Parser)]
#[command(
    name = "afk",
    version,
    about = "Run autonomous coding turns verified through git history"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single agent turn and print the resulting record as JSON.
    Turn {
        /// Session working directory (the repository root).
        #[arg(long)]
        dir: PathBuf,
        /// Session name; becomes part of the audit tag names.
        #[arg(long)]
        session: String,
        /// Prompt to send to the agent.
        #[arg(long)]
        prompt: String,
        /// Why this turn is being run.
        #[arg(long, default_value = "coding")]
        kind: String,
        /// Agent model override.
        #[arg(long)]
        model: Option<String>,
        /// Resume an interrupted session at this turn number.
        #[arg(long)]
        resume_from: Option<u32>,
    },
    /// Print the session's current repository state.
    Status {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        session: String,
    },
}

fn main() {
    afk::logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Turn {
            dir,
            session,
            prompt,
            kind,
            model,
            resume_from,
        } => {
            let dir = std::path::absolute(&dir)
                .with_context(|| format!("resolve directory {}", dir.display()))?;
            let kind = TransitionKind::new(kind)?;
            let driver = ClaudeDriver::new(dir.clone(), model)?;
            let mut session = match resume_from {
                Some(n) => Session::resume_at(dir, driver, &session, n)?,
                None => Session::create(dir, driver, &session)?,
            };
            let record = session.execute_turn(&prompt, kind)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Status { dir, session } => {
            let dir = std::path::absolute(&dir)
                .with_context(|| format!("resolve directory {}", dir.display()))?;
            let git = Git::open(&dir)?;
            let head = git.head()?;
            let head_summary = match &head {
                Some(id) => Some(git.commit_summary(id)?),
                None => None,
            };
            let origin_tag = format!("afk-{session}-0");
            let status = serde_json::json!({
                "dir": dir,
                "session": session,
                "head": head,
                "head_summary": head_summary,
                "started": git.tag_exists(&origin_tag)?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}
