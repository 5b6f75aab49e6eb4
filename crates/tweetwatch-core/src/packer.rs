//! Rule packing: distributing handles over a bounded rule set.
//!
//! Algorithm (greedy, order-preserving):
//! 1. Append `from:<handle>` predicates to the current rule, joined by ` OR `.
//! 2. When the next predicate would push the rule past `max_rule_len`, close
//!    the current rule and start a new one.
//! 3. If `max_rules` rules are already closed while handles remain, fail with
//!    [`RuleError::CapacityExceeded`] before flushing the partial rule.
//! 4. The final, possibly partial, rule is appended last.
//!
//! The output depends only on input order. Callers that need stable add and
//! remove behaviour must keep the handle ordering fixed.

use crate::error::RuleError;
use crate::rule::{RuleBody, RuleLimits};
use crate::types::Handle;

/// Pack handles into rule expressions.
///
/// An empty input yields no expressions; the caller is then responsible for
/// clearing the remote rules rather than submitting an empty expression.
pub fn pack(handles: &[Handle], limits: &RuleLimits) -> Result<Vec<String>, RuleError> {
    Ok(pack_bodies(handles, limits)?
        .iter()
        .map(RuleBody::to_expression)
        .collect())
}

/// Pack handles into structured rule bodies.
///
/// Duplicate handles are placed once.
pub fn pack_bodies(handles: &[Handle], limits: &RuleLimits) -> Result<Vec<RuleBody>, RuleError> {
    let capacity_exceeded = || RuleError::CapacityExceeded {
        max_rules: limits.max_rules,
        max_rule_len: limits.max_rule_len,
        handles: handles.len(),
    };

    let mut packed: Vec<RuleBody> = Vec::new();
    let mut current = RuleBody::new();

    for handle in handles {
        if RuleBody::predicate_len(handle) > limits.max_rule_len {
            return Err(RuleError::HandleTooLong {
                handle: handle.to_string(),
                max_rule_len: limits.max_rule_len,
            });
        }
        if current.contains(handle) || packed.iter().any(|body| body.contains(handle)) {
            continue;
        }

        if !current.is_empty() && current.expression_len_with(handle) > limits.max_rule_len {
            packed.push(std::mem::take(&mut current));
            // The handle in hand still needs a rule of its own
            if packed.len() >= limits.max_rules {
                return Err(capacity_exceeded());
            }
        }
        current.insert(handle.clone());
    }

    if !current.is_empty() {
        packed.push(current);
    }
    if packed.len() > limits.max_rules {
        return Err(capacity_exceeded());
    }

    Ok(packed)
}
