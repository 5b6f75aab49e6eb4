//! Error types for tweetwatch core.

use thiserror::Error;

/// Errors raised while packing or editing filter rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The handles do not fit within the rule count and length limits.
    #[error(
        "rule capacity exceeded: {handles} handles do not fit in {max_rules} rules of {max_rule_len} bytes"
    )]
    CapacityExceeded {
        max_rules: usize,
        max_rule_len: usize,
        handles: usize,
    },

    /// A single handle cannot fit in a rule on its own.
    #[error("handle {handle} does not fit in a {max_rule_len}-byte rule")]
    HandleTooLong { handle: String, max_rule_len: usize },

    /// A remote rule expression is not a `from:` disjunction.
    #[error("unrecognized rule expression: {0}")]
    UnrecognizedExpression(String),
}

impl RuleError {
    /// Whether the error is a capacity rejection the operator can act on.
    pub fn is_capacity(&self) -> bool {
        matches!(self, RuleError::CapacityExceeded { .. })
    }
}

/// Validation errors for handles and questions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("handle is empty")]
    EmptyHandle,

    #[error("handle {handle:?} contains invalid character {ch:?}")]
    InvalidHandleChar { handle: String, ch: char },

    #[error("handle {handle:?} is longer than {max} characters")]
    HandleLength { handle: String, max: usize },

    #[error("question is empty")]
    EmptyQuestion,
}
