//! Pure, deterministic core logic.
//!
//! No I/O lives here: value types, validation, and commit-message parsing
//! only. Everything is testable in isolation.

pub mod outcome;
pub mod transition;
pub mod types;
