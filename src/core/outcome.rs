//! Commit-message trailer scanning.
//!
//! The `outcome: <value>` trailer is the sole structured channel from the
//! agent back to the orchestrator. The key is matched case-insensitively
//! because LLMs capitalize unpredictably, and the last non-empty occurrence
//! wins so an agent correcting itself in a footer is honored.

use std::sync::LazyLock;

use regex::Regex;

static OUTCOME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^outcome:[ \t]*(.*)$").expect("static pattern compiles"));

/// Extract the declared outcome from a full commit message.
///
/// Returns the trimmed, lowercased value of the last non-empty `outcome:`
/// line, or `None` if no line declares one.
pub fn parse_outcome(message: &str) -> Option<String> {
    let mut outcome = None;
    for caps in OUTCOME_LINE.captures_iter(message) {
        let candidate = caps[1].trim();
        if candidate.is_empty() {
            continue;
        }
        outcome = Some(candidate.to_lowercase());
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_when_no_trailer() {
        assert_eq!(parse_outcome("feat: add parser\n\nbody text"), None);
    }

    #[test]
    fn extracts_simple_trailer() {
        assert_eq!(
            parse_outcome("feat: add parser\n\noutcome: success"),
            Some("success".to_string())
        );
    }

    #[test]
    fn last_occurrence_wins() {
        let message = "fix: retry\n\noutcome: partial\n\noutcome: success";
        assert_eq!(parse_outcome(message), Some("success".to_string()));
    }

    #[test]
    fn empty_value_is_absent() {
        assert_eq!(parse_outcome("feat: x\n\noutcome: "), None);
        assert_eq!(parse_outcome("outcome:"), None);
    }

    #[test]
    fn empty_trailing_value_does_not_clobber_earlier_one() {
        let message = "feat: x\n\noutcome: success\noutcome: ";
        assert_eq!(parse_outcome(message), Some("success".to_string()));
    }

    #[test]
    fn key_is_case_insensitive_and_value_lowercased() {
        assert_eq!(
            parse_outcome("feat: x\n\nOutcome: FAILURE"),
            Some("failure".to_string())
        );
        assert_eq!(
            parse_outcome("OUTCOME: Success"),
            Some("success".to_string())
        );
    }

    #[test]
    fn captures_multi_word_and_hyphenated_values() {
        assert_eq!(
            parse_outcome("outcome: needs manual review"),
            Some("needs manual review".to_string())
        );
        assert_eq!(
            parse_outcome("outcome: partial-success"),
            Some("partial-success".to_string())
        );
    }

    #[test]
    fn mid_body_line_counts_but_footer_takes_precedence() {
        let message = "feat: x\n\nthe outcome: of this is unclear\noutcome: done\n";
        // The first line does not start with the key, so only the footer matches.
        assert_eq!(parse_outcome(message), Some("done".to_string()));
    }
}
