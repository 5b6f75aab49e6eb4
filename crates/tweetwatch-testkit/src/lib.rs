//! # tweetwatch Testkit
//!
//! Testing utilities for tweetwatch.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Handle lists with the exact rule expressions they must pack into
//! - **Generators**: Proptest strategies for handles, limits and command sequences
//! - **Fixtures**: In-memory remote, directory and store, plus scripted collaborators
//!
//! ## Golden Vectors
//!
//! ```rust
//! use tweetwatch_testkit::vectors::verify_all_vectors;
//!
//! assert_eq!(verify_all_vectors(), Ok(()));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tweetwatch_core::pack;
//! use tweetwatch_testkit::generators::{distinct_handles, limits};
//!
//! proptest! {
//!     #[test]
//!     fn packing_is_deterministic(hs in distinct_handles(0, 30), l in limits()) {
//!         prop_assert_eq!(pack(&hs, &l), pack(&hs, &l));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tweetwatch_core::RuleLimits;
//! use tweetwatch_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::with_users(&["alice", "bob"]);
//!     let tracker = fixture.tracker(RuleLimits::default());
//!     tracker.subscribe("alice", "Is this about cats?").await.unwrap();
//!     assert_eq!(fixture.rules.expressions(), vec!["from:alice"]);
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{handle, handles, CollectingSink, FixtureTracker, ScriptedClassifier, TestFixture};
pub use generators::Op;
pub use vectors::{all_vectors, verify_all_vectors, Expected, PackingVector};
