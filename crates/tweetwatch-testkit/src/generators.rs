//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tweetwatch_core::{Handle, RuleLimits, MAX_HANDLE_LEN};

/// Generate a valid handle of 1 to 15 characters.
pub fn handle() -> impl Strategy<Value = Handle> {
    "[a-z][a-z0-9_]{0,14}".prop_filter_map("invalid handle", |raw| Handle::new(raw).ok())
}

/// Generate between `min` and `max` distinct handles, in random order.
pub fn distinct_handles(min: usize, max: usize) -> impl Strategy<Value = Vec<Handle>> {
    prop::collection::btree_set(handle(), min..=max)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Generate rule limits that can always hold at least one handle.
pub fn limits() -> impl Strategy<Value = RuleLimits> {
    let min_len = "from:".len() + MAX_HANDLE_LEN;
    (1usize..=6, min_len..=120).prop_map(|(max_rules, max_rule_len)| {
        RuleLimits::new(max_rules, max_rule_len)
    })
}

/// A subscription command against a fixed pool of handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Subscribe the handle at this pool index.
    Add(usize),
    /// Unsubscribe the handle at this pool index.
    Remove(usize),
}

/// Generate a sequence of add/remove commands over a pool of `pool` handles.
pub fn ops(pool: usize, max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    let pool = pool.max(1);
    let op = prop_oneof![
        (0..pool).prop_map(Op::Add),
        (0..pool).prop_map(Op::Remove),
    ];
    prop::collection::vec(op, 0..=max_len)
}
