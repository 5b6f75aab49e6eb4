//! Convergence verification for remote rules.
//!
//! After a resync or a run of incremental edits, the handles matched by the
//! remote rules should equal the tracked set. This module compares the two
//! and computes a deterministic fingerprint of a handle set for logging.

use std::collections::BTreeSet;
use std::fmt;

use tweetwatch_core::{Handle, Rule};

use crate::client::RuleClient;
use crate::error::Result;

/// Blake3 digest of a handle set, independent of order and packing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleSetFingerprint(pub [u8; 32]);

impl RuleSetFingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RuleSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleSetFingerprint({})", self)
    }
}

impl fmt::Display for RuleSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Fingerprint a set of handles.
///
/// Algorithm:
/// 1. Deduplicate and sort the handles
/// 2. Hash: Blake3(domain || handle || 0x00 || handle || 0x00 ...)
pub fn fingerprint<'a, I>(handles: I) -> RuleSetFingerprint
where
    I: IntoIterator<Item = &'a Handle>,
{
    let sorted: BTreeSet<&Handle> = handles.into_iter().collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tweetwatch-rules-v0:");
    for handle in sorted {
        hasher.update(handle.as_str().as_bytes());
        hasher.update(&[0]);
    }
    RuleSetFingerprint(*hasher.finalize().as_bytes())
}

/// The handles matched by a set of remote rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMembership {
    pub handles: BTreeSet<Handle>,
    /// Rules that are not `from:` disjunctions.
    pub foreign: Vec<Rule>,
}

impl RemoteMembership {
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut membership = Self::default();
        for rule in rules {
            match rule.body() {
                Ok(body) => membership.handles.extend(body.handles().iter().cloned()),
                Err(_) => membership.foreign.push(rule.clone()),
            }
        }
        membership
    }

    pub fn fingerprint(&self) -> RuleSetFingerprint {
        fingerprint(&self.handles)
    }
}

/// Result of comparing remote rules with the tracked set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Remote membership equals the tracked set.
    Converged,
    /// Remote membership differs.
    Diverged {
        /// Tracked but not matched by any rule.
        missing: Vec<Handle>,
        /// Matched by a rule but not tracked.
        unexpected: Vec<Handle>,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare remote membership with `targets`.
pub fn compare(remote: &RemoteMembership, targets: &[Handle]) -> ConvergenceResult {
    let wanted: BTreeSet<&Handle> = targets.iter().collect();

    let missing: Vec<Handle> = wanted
        .iter()
        .filter(|h| !remote.handles.contains(**h))
        .map(|h| (*h).clone())
        .collect();
    let unexpected: Vec<Handle> = remote
        .handles
        .iter()
        .filter(|h| !wanted.contains(h))
        .cloned()
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        ConvergenceResult::Converged
    } else {
        ConvergenceResult::Diverged {
            missing,
            unexpected,
        }
    }
}

/// Fetch the remote rules and compare them with `targets`.
pub async fn verify_rule_set<R: RuleClient + ?Sized>(
    client: &R,
    targets: &[Handle],
) -> Result<ConvergenceResult> {
    let rules = client.get_rules().await?;
    let remote = RemoteMembership::from_rules(&rules);

    if !remote.foreign.is_empty() {
        tracing::debug!(
            foreign = remote.foreign.len(),
            "ignoring rules not managed by tweetwatch"
        );
    }

    Ok(compare(&remote, targets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryRuleService;
    use tweetwatch_core::RuleId;

    fn handles(raw: &[&str]) -> Vec<Handle> {
        raw.iter().map(|h| Handle::new(h).unwrap()).collect()
    }

    #[test]
    fn test_fingerprint_ignores_order_and_duplicates() {
        let a = fingerprint(&handles(&["ann", "bob", "carl"]));
        let b = fingerprint(&handles(&["carl", "ann", "bob", "ann"]));
        assert_eq!(a, b);

        let c = fingerprint(&handles(&["ann", "bob"]));
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_separates_handles() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = fingerprint(&handles(&["ab", "c"]));
        let b = fingerprint(&handles(&["a", "bc"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_membership_skips_foreign_rules() {
        let rules = vec![
            Rule::remote(RuleId::new("1"), "from:ann OR from:bob"),
            Rule::remote(RuleId::new("2"), "#rustlang has:links"),
        ];
        let membership = RemoteMembership::from_rules(&rules);

        assert_eq!(membership.handles.len(), 2);
        assert_eq!(membership.foreign.len(), 1);
        assert_eq!(membership.fingerprint(), fingerprint(&handles(&["bob", "ann"])));
    }

    #[test]
    fn test_compare_reports_both_sides() {
        let rules = vec![Rule::remote(RuleId::new("1"), "from:ann OR from:zed")];
        let remote = RemoteMembership::from_rules(&rules);

        let result = compare(&remote, &handles(&["ann", "bob"]));
        assert_eq!(
            result,
            ConvergenceResult::Diverged {
                missing: handles(&["bob"]),
                unexpected: handles(&["zed"]),
            }
        );
    }

    #[tokio::test]
    async fn test_verify_rule_set_converged() {
        let service = MemoryRuleService::with_rules(["from:ann OR from:bob", "from:carl"]);
        let result = verify_rule_set(&service, &handles(&["carl", "bob", "ann"]))
            .await
            .unwrap();
        assert!(result.is_converged());
    }
}
