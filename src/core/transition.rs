//! Validated transition-kind identifiers.
//!
//! A transition kind classifies why a turn was run (e.g. `init`, `coding`).
//! It ends up in transcript filenames, so the allowed alphabet is restricted
//! at construction time.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.-]*$").expect("static pattern compiles"));

/// The transition kind string did not match `^[a-z][a-z0-9_.-]*$`.
#[derive(Debug, thiserror::Error)]
#[error("transition kind must match ^[a-z][a-z0-9_.-]*$, got {0:?}")]
pub struct InvalidTransitionKind(pub String);

/// Immutable value type for a validated transition kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransitionKind(String);

impl TransitionKind {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidTransitionKind> {
        let value = value.into();
        if !KIND_PATTERN.is_match(&value) {
            return Err(InvalidTransitionKind(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TransitionKind {
    type Err = InvalidTransitionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_kinds() {
        for value in ["init", "coding", "a", "fix-up", "v2.phase_1", "x9"] {
            let kind = TransitionKind::new(value).expect(value);
            assert_eq!(kind.to_string(), value);
        }
    }

    #[test]
    fn rejects_invalid_kinds() {
        for value in [
            "", "Init", "1coding", "-dash", ".dot", "has space", "a/b", "a\\b", "café",
        ] {
            assert!(TransitionKind::new(value).is_err(), "accepted {value:?}");
        }
    }

    #[test]
    fn equality_and_hash_by_value() {
        use std::collections::HashSet;

        let a = TransitionKind::new("coding").expect("valid");
        let b = TransitionKind::new("coding").expect("valid");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn round_trips_through_from_str() {
        let kind: TransitionKind = "coding".parse().expect("valid");
        assert_eq!(kind.as_str(), "coding");
    }
}
