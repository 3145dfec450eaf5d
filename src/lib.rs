//! Git-verified autonomous coding turn orchestrator.
//!
//! Each turn sends a prompt to an external coding-agent CLI, lets it edit
//! the repository and commit, then classifies what happened by inspecting
//! the commit history rather than parsing the agent's free-form output. The
//! contract is "exactly one commit per turn"; every way an untrusted process
//! can violate it (zero commits, multiple commits, orphan branches, signals,
//! nonzero exits) gets distinct, debuggable error semantics.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure value types and parsing. No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting adapters (git subprocess, transcripts, the
//!   agent driver). Isolated to enable scripted stand-ins in tests.
//!
//! Orchestration modules ([`turn`], [`resolve`], [`session`]) coordinate
//! core logic with I/O to drive turns end-to-end.

pub mod core;
pub mod io;
pub mod logging;
pub mod resolve;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;

pub use crate::io::git::GitError;
pub use crate::resolve::ResolveError;
pub use crate::session::SessionError;
pub use crate::turn::TurnError;
