//! Filter rules: `from:<handle> OR from:<handle> ...` disjunctions.
//!
//! A rule's membership is kept as an ordered set of handles ([`RuleBody`]).
//! The textual expression is only produced when a rule is written to the
//! remote service, and parsed back when rules are fetched. Editing text in
//! place is never done: removing `ann` from `from:ann2 OR from:ann` must not
//! touch `ann2`.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::types::{Handle, RuleId};

/// Per-handle predicate prefix.
pub const FROM_PREFIX: &str = "from:";

/// Separator between predicates.
pub const OR_SEPARATOR: &str = " OR ";

/// Default number of rules the remote service allows.
pub const DEFAULT_MAX_RULES: usize = 5;

/// Default maximum rule length in bytes.
pub const DEFAULT_MAX_RULE_LEN: usize = 512;

/// Remote quota on rules. These reflect a third-party plan and are
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLimits {
    /// Maximum number of live rules.
    pub max_rules: usize,
    /// Maximum expression length in bytes.
    pub max_rule_len: usize,
}

impl RuleLimits {
    pub const fn new(max_rules: usize, max_rule_len: usize) -> Self {
        Self {
            max_rules,
            max_rule_len,
        }
    }
}

impl Default for RuleLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RULES, DEFAULT_MAX_RULE_LEN)
    }
}

/// A rule as stored on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Remote identifier; unset until the service has accepted the rule.
    pub id: Option<RuleId>,
    /// The rule text.
    pub expression: String,
}

impl Rule {
    /// A rule that has not been submitted yet.
    pub fn unsubmitted(expression: impl Into<String>) -> Self {
        Self {
            id: None,
            expression: expression.into(),
        }
    }

    /// A rule as returned by the remote service.
    pub fn remote(id: RuleId, expression: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            expression: expression.into(),
        }
    }

    /// Parse the expression into a structured body.
    pub fn body(&self) -> Result<RuleBody, RuleError> {
        RuleBody::parse(&self.expression)
    }
}

/// The structured membership of a rule: an ordered set of handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBody {
    handles: Vec<Handle>,
}

impl RuleBody {
    /// An empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// A body holding a single handle.
    pub fn single(handle: Handle) -> Self {
        Self {
            handles: vec![handle],
        }
    }

    /// Parse `from:a OR from:b` into a body.
    ///
    /// Anything other than a plain disjunction of `from:` predicates is
    /// rejected, so rules created by other tools are never edited.
    pub fn parse(expression: &str) -> Result<Self, RuleError> {
        let unrecognized = || RuleError::UnrecognizedExpression(expression.to_string());

        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(unrecognized());
        }

        let mut body = RuleBody::new();
        for token in trimmed.split(OR_SEPARATOR) {
            let raw = token.trim().strip_prefix(FROM_PREFIX).ok_or_else(unrecognized)?;
            let handle = Handle::new(raw).map_err(|_| unrecognized())?;
            body.insert(handle);
        }
        Ok(body)
    }

    /// The handles, in insertion order.
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Number of handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.handles.contains(handle)
    }

    /// Append a handle. Returns false if it was already present.
    pub fn insert(&mut self, handle: Handle) -> bool {
        if self.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Remove a handle. Returns false if it was not present.
    pub fn remove(&mut self, handle: &Handle) -> bool {
        let before = self.handles.len();
        self.handles.retain(|h| h != handle);
        self.handles.len() != before
    }

    /// Length of a predicate for `handle` on its own.
    pub fn predicate_len(handle: &Handle) -> usize {
        FROM_PREFIX.len() + handle.len()
    }

    /// Length of the serialized expression.
    pub fn expression_len(&self) -> usize {
        let predicates: usize = self.handles.iter().map(Self::predicate_len).sum();
        let separators = self.handles.len().saturating_sub(1) * OR_SEPARATOR.len();
        predicates + separators
    }

    /// Length the expression would have after appending `handle`.
    pub fn expression_len_with(&self, handle: &Handle) -> usize {
        if self.contains(handle) {
            return self.expression_len();
        }
        let separator = if self.is_empty() { 0 } else { OR_SEPARATOR.len() };
        self.expression_len() + separator + Self::predicate_len(handle)
    }

    /// Serialize to the remote expression syntax.
    pub fn to_expression(&self) -> String {
        let mut expression = String::with_capacity(self.expression_len());
        for (i, handle) in self.handles.iter().enumerate() {
            if i > 0 {
                expression.push_str(OR_SEPARATOR);
            }
            expression.push_str(FROM_PREFIX);
            expression.push_str(handle.as_str());
        }
        expression
    }
}

impl FromIterator<Handle> for RuleBody {
    fn from_iter<I: IntoIterator<Item = Handle>>(iter: I) -> Self {
        let mut body = RuleBody::new();
        for handle in iter {
            body.insert(handle);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: &str) -> Handle {
        Handle::new(raw).unwrap()
    }

    #[test]
    fn test_expression_serialization() {
        let body: RuleBody = [h("ann"), h("bob")].into_iter().collect();
        assert_eq!(body.to_expression(), "from:ann OR from:bob");
        assert_eq!(body.expression_len(), "from:ann OR from:bob".len());
    }

    #[test]
    fn test_expression_len_with() {
        let body = RuleBody::single(h("ann"));
        assert_eq!(body.expression_len_with(&h("bob")), 20);
        assert_eq!(RuleBody::new().expression_len_with(&h("bob")), 8);
        // Already present: length unchanged
        assert_eq!(body.expression_len_with(&h("ann")), 8);
    }

    #[test]
    fn test_parse_roundtrip_keeps_order() {
        let body = RuleBody::parse("from:zed OR from:ann OR from:bob").unwrap();
        let handles: Vec<&str> = body.handles().iter().map(Handle::as_str).collect();
        assert_eq!(handles, vec!["zed", "ann", "bob"]);
    }

    #[test]
    fn test_parse_rejects_foreign_rules() {
        assert!(RuleBody::parse("cats has:images").is_err());
        assert!(RuleBody::parse("from:ann OR #rustlang").is_err());
        assert!(RuleBody::parse("").is_err());
    }

    #[test]
    fn test_remove_does_not_touch_prefixed_handles() {
        let mut body = RuleBody::parse("from:ann2 OR from:ann OR from:annie").unwrap();
        assert!(body.remove(&h("ann")));
        assert_eq!(body.to_expression(), "from:ann2 OR from:annie");
        assert!(!body.remove(&h("ann")));
    }

    #[test]
    fn test_insert_is_set_like() {
        let mut body = RuleBody::new();
        assert!(body.insert(h("ann")));
        assert!(!body.insert(h("ann")));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_rule_body_from_remote() {
        let rule = Rule::remote(RuleId::new("1"), "from:ann");
        assert_eq!(rule.body().unwrap(), RuleBody::single(h("ann")));
        assert!(Rule::unsubmitted("from:bob").id.is_none());
    }
}
