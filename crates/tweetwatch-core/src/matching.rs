//! Match decisions on classifier output.
//!
//! The classifier returns free-form text. An event matches iff the token
//! `yes` appears anywhere in the response, ignoring case. This is a
//! deliberately permissive approximation, not a parser: "eyes" and
//! "yes and no" both count as a match.

use serde::{Deserialize, Serialize};

/// Token whose presence marks a positive answer.
pub const AFFIRMATIVE_TOKEN: &str = "yes";

/// Whether a classifier response counts as a match.
pub fn is_affirmative(response: &str) -> bool {
    response.to_lowercase().contains(AFFIRMATIVE_TOKEN)
}

/// Outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub is_match: bool,
    /// The classifier's answer, or the reason no answer was obtained.
    pub rationale: String,
}

impl MatchResult {
    /// Decide from a classifier response.
    pub fn from_response(response: impl Into<String>) -> Self {
        let rationale = response.into();
        Self {
            is_match: is_affirmative(&rationale),
            rationale,
        }
    }

    /// A non-match with the given reason.
    pub fn no_match(reason: impl Into<String>) -> Self {
        Self {
            is_match: false,
            rationale: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_answer() {
        let result = MatchResult::from_response("No, it does not match.");
        assert!(!result.is_match);
        assert_eq!(result.rationale, "No, it does not match.");
    }

    #[test]
    fn test_positive_answer() {
        assert!(MatchResult::from_response("Yes, tweet matches.").is_match);
        assert!(MatchResult::from_response("YES").is_match);
        assert!(MatchResult::from_response("the answer is yes").is_match);
    }

    #[test]
    fn test_substring_rule_is_permissive() {
        assert!(is_affirmative("My eyes are open"));
        assert!(!is_affirmative("Nope"));
        assert!(!is_affirmative(""));
    }
}
