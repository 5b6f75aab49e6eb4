//! Golden packing vectors.
//!
//! Each vector fixes the rule expressions a handle list must pack into under
//! given limits. Any change to packing order, separators or limit checks
//! shows up here.

use tweetwatch_core::{pack, RuleError, RuleLimits};

use crate::fixtures::handles;

/// Expected outcome of packing a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Rules(&'static [&'static str]),
    CapacityExceeded,
    HandleTooLong(&'static str),
}

/// A golden packing vector.
#[derive(Debug, Clone)]
pub struct PackingVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Input handles, in store order.
    pub handles: &'static [&'static str],
    pub max_rules: usize,
    pub max_rule_len: usize,
    pub expected: Expected,
}

impl PackingVector {
    pub fn limits(&self) -> RuleLimits {
        RuleLimits::new(self.max_rules, self.max_rule_len)
    }
}

/// Get all golden packing vectors.
pub fn all_vectors() -> Vec<PackingVector> {
    vec![
        PackingVector {
            name: "no handles",
            handles: &[],
            max_rules: 5,
            max_rule_len: 512,
            expected: Expected::Rules(&[]),
        },
        PackingVector {
            name: "three short handles in one rule",
            handles: &["ann", "bob", "cat"],
            max_rules: 5,
            max_rule_len: 512,
            expected: Expected::Rules(&["from:ann OR from:bob OR from:cat"]),
        },
        PackingVector {
            name: "exact fit is inclusive",
            handles: &["ann", "bob"],
            max_rules: 5,
            max_rule_len: 20,
            expected: Expected::Rules(&["from:ann OR from:bob"]),
        },
        PackingVector {
            name: "split before a long handle",
            handles: &["ann", "bob", "carlos_long_name"],
            max_rules: 5,
            max_rule_len: 21,
            expected: Expected::Rules(&["from:ann OR from:bob", "from:carlos_long_name"]),
        },
        PackingVector {
            name: "long handle alone exceeds limit",
            handles: &["ann", "bob", "carlos_long_name"],
            max_rules: 5,
            max_rule_len: 20,
            expected: Expected::HandleTooLong("carlos_long_name"),
        },
        PackingVector {
            name: "duplicates placed once",
            handles: &["ann", "bob", "ann"],
            max_rules: 5,
            max_rule_len: 512,
            expected: Expected::Rules(&["from:ann OR from:bob"]),
        },
        PackingVector {
            name: "one rule per handle",
            handles: &["aa", "bb", "cc", "dd", "ee"],
            max_rules: 5,
            max_rule_len: 10,
            expected: Expected::Rules(&["from:aa", "from:bb", "from:cc", "from:dd", "from:ee"]),
        },
        PackingVector {
            name: "six handles over five rules",
            handles: &["aa", "bb", "cc", "dd", "ee", "ff"],
            max_rules: 5,
            max_rule_len: 10,
            expected: Expected::CapacityExceeded,
        },
    ]
}

/// Pack every vector and report the names of those that disagree.
pub fn verify_all_vectors() -> Result<(), Vec<&'static str>> {
    let failures: Vec<_> = all_vectors()
        .into_iter()
        .filter(|v| !matches_expected(v))
        .map(|v| v.name)
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

fn matches_expected(vector: &PackingVector) -> bool {
    let result = pack(&handles(vector.handles), &vector.limits());
    match (vector.expected, result) {
        (Expected::Rules(expected), Ok(rules)) => rules == expected,
        (Expected::CapacityExceeded, Err(e)) => e.is_capacity(),
        (Expected::HandleTooLong(name), Err(RuleError::HandleTooLong { handle, .. })) => {
            handle == name
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        assert_eq!(verify_all_vectors(), Ok(()));
    }

    #[test]
    fn test_vector_names_unique() {
        let mut names: Vec<_> = all_vectors().iter().map(|v| v.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
