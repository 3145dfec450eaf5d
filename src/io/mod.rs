//! Side-effecting adapters: repository, transcripts, agent process.
//!
//! Kept separate from [`crate::core`] so orchestration can be exercised in
//! tests with scripted stand-ins.

pub mod driver;
pub mod git;
pub mod turn_log;
