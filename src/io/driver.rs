//! Driver abstraction for agent invocation.
//!
//! The [`Driver`] trait decouples turn orchestration from the actual agent
//! backend (currently `claude --print` under `script(1)` terminal capture).
//! Tests use scripted drivers that mutate a repository and return
//! predetermined statuses without spawning processes.
//!
//! The core never interprets the exit status here; it hands the raw
//! [`DriverStatus`] to the outcome resolver.

use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// Raw result of one driver invocation.
///
/// Non-negative values are ordinary exit codes; a negative value encodes
/// "terminated by signal `-raw`", mirroring the wait status convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatus(i32);

impl DriverStatus {
    pub fn exited(code: i32) -> Self {
        Self(code)
    }

    pub fn signaled(signal: i32) -> Self {
        Self(-signal)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn success(self) -> bool {
        self.0 == 0
    }

    /// Terminating signal number, if the process was killed by one.
    pub fn signal(self) -> Option<i32> {
        (self.0 < 0).then_some(-self.0)
    }
}

impl From<ExitStatus> for DriverStatus {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::exited(code);
        }
        match status.signal() {
            Some(signal) => Self::signaled(signal),
            // A reaped child always has an exit code or a termination
            // signal; anything else (e.g. a raw stop status) becomes a
            // positive sentinel so it can never read as a signal.
            None => Self::exited(i32::MAX),
        }
    }
}

/// Abstraction over agent execution backends.
///
/// Contract: run the agent with `prompt`, capture its combined output to
/// `transcript`, and report how the process ended. Implementations must not
/// delete a partial transcript on failure; it is the postmortem record.
pub trait Driver {
    fn run(&self, prompt: &str, transcript: &Path) -> Result<DriverStatus>;
}

static ENV_CHECK: OnceLock<Result<(), String>> = OnceLock::new();

/// Driver that spawns the `claude` CLI wrapped in `script(1)`.
///
/// `script` tees everything the agent prints (including control characters
/// from an interrupt) into the transcript while this process echoes it to
/// the terminal for liveness.
pub struct ClaudeDriver {
    working_dir: PathBuf,
    model: Option<String>,
}

impl ClaudeDriver {
    /// Validate the runtime environment once per process, then construct.
    pub fn new(working_dir: PathBuf, model: Option<String>) -> Result<Self> {
        check_environment()?;
        if !working_dir.is_absolute() {
            return Err(anyhow!(
                "working_dir must be an absolute path, got {}",
                working_dir.display()
            ));
        }
        Ok(Self { working_dir, model })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn build_command(&self, prompt: &str, transcript: &Path) -> Command {
        let mut agent = vec!["claude".to_string(), "--print".to_string()];
        if let Some(model) = &self.model {
            agent.push("--model".to_string());
            agent.push(model.clone());
        }
        agent.push(prompt.to_string());

        let mut cmd = Command::new("script");
        if cfg!(target_os = "macos") {
            // BSD script: script -a -q <file> <command...>
            cmd.arg("-a").arg("-q").arg(transcript);
            cmd.args(&agent);
        } else {
            // util-linux script: script -a -q -c <command-string> <file>
            let quoted: Vec<String> = agent.iter().map(|a| shell_quote(a)).collect();
            cmd.arg("-a")
                .arg("-q")
                .arg("-c")
                .arg(quoted.join(" "))
                .arg(transcript);
        }
        cmd
    }
}

impl Driver for ClaudeDriver {
    #[instrument(skip_all, fields(transcript = %transcript.display()))]
    fn run(&self, prompt: &str, transcript: &Path) -> Result<DriverStatus> {
        if let Some(parent) = transcript.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create transcript dir {}", parent.display()))?;
        }

        let mut cmd = self.build_command(prompt, transcript);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group: the agent CLI spawns further children, and
            // teardown must reach all of them.
            .process_group(0);

        info!(working_dir = %self.working_dir.display(), "starting agent process");
        let child = cmd.spawn().context("spawn agent process")?;
        let mut child = GroupGuard::new(child);

        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .inner()
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        // Echo output while the child runs so a caller can observe liveness
        // without waiting for process exit. `script` handles the transcript.
        let out_handle = thread::spawn(move || echo_stream(stdout, io::stdout()));
        let err_handle = thread::spawn(move || echo_stream(stderr, io::stderr()));

        let status = child.wait().context("wait for agent process")?;

        join_echo(out_handle).context("echo stdout")?;
        join_echo(err_handle).context("echo stderr")?;

        let status = DriverStatus::from(status);
        debug!(raw_status = status.raw(), "agent process finished");
        Ok(status)
    }
}

/// Child wrapper whose drop terminates the whole process group.
///
/// Spawned with `process_group(0)`, so the child's pid doubles as its pgid.
/// Teardown is graduated: SIGTERM, a bounded grace period so `script` can
/// flush the transcript, then SIGKILL.
struct GroupGuard {
    child: Child,
    reaped: bool,
}

impl GroupGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn inner(&mut self) -> &mut Child {
        &mut self.child
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.reaped || matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        warn!("agent process still running, terminating process group");
        signal_group(self.child.id(), libc::SIGTERM);
        match self.child.wait_timeout(Duration::from_secs(5)) {
            Ok(Some(_)) => {}
            _ => {
                signal_group(self.child.id(), libc::SIGKILL);
                let _ = self.child.wait();
            }
        }
    }
}

#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: i32) {
    // killpg only reads its arguments; failure (group already gone) is fine.
    unsafe {
        libc::killpg(pid as libc::pid_t, signal);
    }
}

fn echo_stream<R: Read, W: Write>(reader: R, mut writer: W) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&line)?;
        writer.flush()?;
    }
}

fn join_echo(handle: thread::JoinHandle<io::Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(anyhow!("echo thread panicked")),
    }
}

fn check_environment() -> Result<()> {
    let result = ENV_CHECK.get_or_init(|| {
        require_runnable("git", &["--version"])?;
        require_on_path("script")?;
        require_runnable("claude", &["--version"])?;
        Ok(())
    });
    result.clone().map_err(|msg| anyhow!(msg))
}

fn require_runnable(name: &str, args: &[&str]) -> std::result::Result<(), String> {
    let run = Command::new(name)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match run {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!(
            "`{name} {}` failed (exit {:?})",
            args.join(" "),
            status.code()
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(format!("`{name}` not found on PATH"))
        }
        Err(err) => Err(format!("failed to run `{name}`: {err}")),
    }
}

fn require_on_path(name: &str) -> std::result::Result<(), String> {
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        if dir.join(name).is_file() {
            return Ok(());
        }
    }
    Err(format!("`{name}` not found on PATH"))
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"@%+=:,./-_".contains(&b));
    if safe {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
