//! End-to-end outcome resolution scenarios.
//!
//! Each test sets up a real repository in the state an agent process could
//! leave it in, then checks that `resolve_turn` classifies it with the right
//! error semantics and diagnostic context.

use std::fs;
use std::path::PathBuf;

use afk::io::driver::DriverStatus;
use afk::resolve::{ResolveError, resolve_turn};
use afk::test_support::TestRepo;

fn transcript_with(repo: &TestRepo, lines: &[&str]) -> PathBuf {
    let path = repo.path().join("logs").join("turn-00001-coding.log");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, lines.join("\n")).expect("write");
    path
}

#[test]
fn single_commit_with_outcome_trailer_succeeds() {
    let repo = TestRepo::new().expect("repo");
    let before = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["agent output"]);
    let after = repo
        .commit_file("b.txt", "b", "feat: add b\n\noutcome: success")
        .expect("commit");

    let resolution = resolve_turn(
        DriverStatus::exited(0),
        Some(&before),
        &transcript,
        repo.git(),
    )
    .expect("resolve");

    assert_eq!(resolution.outcome.as_deref(), Some("success"));
    assert_eq!(resolution.commit_id, after);
    assert!(resolution.message.starts_with("feat: add b"));
}

#[test]
fn single_commit_without_trailer_has_no_outcome() {
    let repo = TestRepo::new().expect("repo");
    let before = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["agent output"]);
    repo.commit_file("b.txt", "b", "feat: add b").expect("commit");

    let resolution = resolve_turn(
        DriverStatus::exited(0),
        Some(&before),
        &transcript,
        repo.git(),
    )
    .expect("resolve");

    assert_eq!(resolution.outcome, None);
}

#[test]
fn first_commit_into_unborn_repo_succeeds() {
    let repo = TestRepo::new().expect("repo");
    let transcript = transcript_with(&repo, &["agent output"]);
    let root = repo
        .commit_file("a.txt", "a", "feat: first\n\noutcome: success")
        .expect("commit");

    let resolution =
        resolve_turn(DriverStatus::exited(0), None, &transcript, repo.git()).expect("resolve");

    assert_eq!(resolution.commit_id, root);
}

#[test]
fn zero_commits_is_no_commit_detected_with_diagnostics() {
    let repo = TestRepo::new().expect("repo");
    let head = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(
        &repo,
        &["early chatter", "line 2", "line 3", "line 4", "line 5", "I could not finish"],
    );

    let err = resolve_turn(DriverStatus::exited(0), Some(&head), &transcript, repo.git())
        .unwrap_err();

    assert!(matches!(err, ResolveError::NoCommitDetected { .. }));
    let message = err.to_string();
    assert!(message.contains(head.short()));
    assert!(message.contains(transcript.to_str().expect("utf8 path")));
    assert!(message.contains("I could not finish"));
    // The tail is capped at the final lines; the earliest chatter is gone.
    assert!(!message.contains("early chatter"));
}

#[test]
fn two_commits_are_listed_by_subject() {
    let repo = TestRepo::new().expect("repo");
    let before = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["agent output"]);
    repo.commit_file("b.txt", "b", "feat: add b").expect("commit");
    repo.commit_file("c.txt", "c", "feat: add c").expect("commit");

    let err = resolve_turn(
        DriverStatus::exited(0),
        Some(&before),
        &transcript,
        repo.git(),
    )
    .unwrap_err();

    assert!(matches!(err, ResolveError::MultipleCommits { .. }));
    let message = err.to_string();
    assert!(message.contains("found 2"));
    assert!(message.contains("feat: add b"));
    assert!(message.contains("feat: add c"));
}

#[test]
fn nonzero_exit_reports_the_code() {
    let repo = TestRepo::new().expect("repo");
    let head = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["boom"]);

    let err = resolve_turn(
        DriverStatus::exited(42),
        Some(&head),
        &transcript,
        repo.git(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::DriverFailed { exit_code: 42, .. }
    ));
    let message = err.to_string();
    assert!(message.contains("42"));
    assert!(message.contains(transcript.to_str().expect("utf8 path")));
}

#[test]
fn signal_termination_reports_name_and_number() {
    let repo = TestRepo::new().expect("repo");
    let head = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["interrupted"]);

    let err = resolve_turn(
        DriverStatus::signaled(15),
        Some(&head),
        &transcript,
        repo.git(),
    )
    .unwrap_err();

    assert!(matches!(err, ResolveError::DriverSignaled { signal: 15, .. }));
    let message = err.to_string();
    assert!(message.contains("SIGTERM"));
    assert!(message.contains("15"));
}

#[test]
fn unborn_head_after_execution_is_fatal() {
    let repo = TestRepo::new().expect("repo");
    let transcript = transcript_with(&repo, &["nothing happened"]);

    let err = resolve_turn(DriverStatus::exited(0), None, &transcript, repo.git()).unwrap_err();

    assert!(matches!(err, ResolveError::UnbornHead { .. }));
    assert!(err.to_string().contains("unborn"));
}

#[test]
fn orphan_branch_commit_is_ancestry_mismatch() {
    let repo = TestRepo::new().expect("repo");
    let before = repo.commit_file("a.txt", "a", "feat: a").expect("commit");
    let transcript = transcript_with(&repo, &["agent output"]);

    repo.checkout_orphan("rogue").expect("orphan");
    let after = repo.commit_file("b.txt", "b", "feat: rogue").expect("commit");

    let err = resolve_turn(
        DriverStatus::exited(0),
        Some(&before),
        &transcript,
        repo.git(),
    )
    .unwrap_err();

    assert!(matches!(err, ResolveError::AncestryMismatch { .. }));
    let message = err.to_string();
    assert!(message.contains(before.short()));
    assert!(message.contains(after.short()));
}
