//! Transcript files for individual turns.
//!
//! Transcripts are product artifacts under `{session_root}/logs/`, written
//! regardless of `RUST_LOG`. Each turn gets a fresh file named
//! `turn-{NNNNN}-{kind}.log` holding a START marker, whatever the agent
//! process printed, and a terminal END or ABORT marker.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::transition::TransitionKind;
use crate::core::types::TurnNumber;

/// Byte budget for the raw tail read before line-splitting. Bounds memory
/// use when diagnosing huge transcripts.
pub const TAIL_BYTE_BUDGET: usize = 2000;

/// Number of final transcript lines included in diagnostics.
pub const TAIL_LINES: usize = 5;

/// Open transcript file for one turn.
#[derive(Debug)]
pub struct TurnLog {
    turn_number: TurnNumber,
    path: PathBuf,
}

impl TurnLog {
    /// Transcript filename for a turn: `turn-{NNNNN}-{kind}.log`.
    pub fn filename(turn_number: TurnNumber, kind: &TransitionKind) -> String {
        format!("turn-{:05}-{}.log", turn_number.get(), kind)
    }

    /// Log directory for a session root: `{root}/logs`.
    pub fn log_dir(session_root: &Path) -> PathBuf {
        session_root.join("logs")
    }

    /// Create a fresh transcript, truncating any previous file of the same
    /// name, and write the START marker.
    pub fn create(
        session_root: &Path,
        turn_number: TurnNumber,
        kind: &TransitionKind,
    ) -> std::io::Result<Self> {
        let dir = Self::log_dir(session_root);
        fs::create_dir_all(&dir)?;
        let path = dir.join(Self::filename(turn_number, kind));
        fs::write(&path, format!("=== Turn {turn_number} START ===\n"))?;
        Ok(Self { turn_number, path })
    }

    pub fn turn_number(&self) -> TurnNumber {
        self.turn_number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line to the transcript.
    pub fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Last few lines of a transcript for inline diagnostics.
///
/// Reads at most `TAIL_BYTE_BUDGET` bytes from the end of the file and keeps
/// the final `TAIL_LINES` lines. Never fails: an unreadable transcript
/// yields a placeholder, since this only ever annotates another error.
pub fn tail(path: &Path) -> String {
    let bytes = match read_tail(path) {
        Ok(bytes) => bytes,
        Err(_) => return format!("(transcript unavailable: {})", path.display()),
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let keep = lines.len().saturating_sub(TAIL_LINES);
    lines[keep..].join("\n")
}

/// Seek to the final window and read at most `TAIL_BYTE_BUDGET` bytes, so
/// a multi-hundred-megabyte transcript never gets loaded whole.
fn read_tail(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_BYTE_BUDGET as u64);
    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::with_capacity((len - start) as usize);
    file.take(TAIL_BYTE_BUDGET as u64).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(value: &str) -> TransitionKind {
        TransitionKind::new(value).expect("valid kind")
    }

    fn number(n: u32) -> TurnNumber {
        TurnNumber::new(n).expect("valid number")
    }

    #[test]
    fn filename_is_zero_padded() {
        assert_eq!(
            TurnLog::filename(number(3), &kind("coding")),
            "turn-00003-coding.log"
        );
        assert_eq!(
            TurnLog::filename(number(99_999), &kind("init")),
            "turn-99999-init.log"
        );
    }

    #[test]
    fn create_truncates_and_writes_start_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = TurnLog::create(temp.path(), number(1), &kind("init")).expect("create");
        log.append("old content").expect("append");

        // Re-creating the same turn's log starts over.
        let log = TurnLog::create(temp.path(), number(1), &kind("init")).expect("create");
        let contents = fs::read_to_string(log.path()).expect("read");
        assert_eq!(contents, "=== Turn 1 START ===\n");
    }

    #[test]
    fn append_adds_lines_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = TurnLog::create(temp.path(), number(2), &kind("coding")).expect("create");
        log.append("line one").expect("append");
        log.append("line two").expect("append");

        let contents = fs::read_to_string(log.path()).expect("read");
        assert!(contents.ends_with("line one\nline two\n"));
    }

    #[test]
    fn tail_returns_last_lines_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("t.log");
        let body: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, body).expect("write");

        let got = tail(&path);
        assert_eq!(got, "line 16\nline 17\nline 18\nline 19\nline 20");
    }

    #[test]
    fn tail_is_bounded_on_huge_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("t.log");
        fs::write(&path, "x".repeat(100_000)).expect("write");

        assert!(tail(&path).len() <= TAIL_BYTE_BUDGET);
    }

    #[test]
    fn tail_reads_only_the_final_byte_window() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("t.log");
        let mut body = "x".repeat(100_000);
        body.push_str("\nthe very last line\n");
        fs::write(&path, &body).expect("write");

        let bytes = read_tail(&path).expect("read");
        assert_eq!(bytes.len(), TAIL_BYTE_BUDGET);
        assert_eq!(bytes, &body.as_bytes()[body.len() - TAIL_BYTE_BUDGET..]);
        assert!(tail(&path).ends_with("the very last line"));
    }

    #[test]
    fn tail_read_of_a_short_file_returns_it_whole() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("t.log");
        fs::write(&path, "short\n").expect("write");

        assert_eq!(read_tail(&path).expect("read"), b"short\n");
    }

    #[test]
    fn tail_handles_missing_file() {
        let got = tail(Path::new("/no/such/transcript.log"));
        assert!(got.contains("transcript unavailable"));
        assert!(got.contains("/no/such/transcript.log"));
    }
}
