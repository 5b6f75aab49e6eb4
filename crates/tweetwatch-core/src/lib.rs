//! # tweetwatch Core
//!
//! Pure primitives for tweetwatch: tracked handles, filter rules, rule
//! packing, stream events and match decisions.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Handle`] - A validated account handle
//! - [`TrackedEntity`] - A subscription: handle, stable id and question
//! - [`RuleBody`] - The structured membership of one filter rule
//! - [`Rule`] - A filter rule as seen on the remote service
//! - [`StreamEvent`] - One post delivered by the filtered stream
//! - [`MatchResult`] - The outcome of classifying an event
//!
//! ## Packing
//!
//! The remote service accepts a bounded number of rules of bounded length.
//! [`pack`] distributes handles over as few `from:<handle> OR ...` rules as
//! possible. See the [`packer`] module.

pub mod error;
pub mod event;
pub mod matching;
pub mod packer;
pub mod rule;
pub mod types;
pub mod validation;

pub use error::{RuleError, ValidationError};
pub use event::{Author, StreamEvent};
pub use matching::{is_affirmative, MatchResult};
pub use packer::{pack, pack_bodies};
pub use rule::{Rule, RuleBody, RuleLimits, DEFAULT_MAX_RULES, DEFAULT_MAX_RULE_LEN};
pub use types::{EntityId, EventId, Handle, RuleId, TrackedEntity};
pub use validation::{validate_question, validate_subscription_handle, MAX_HANDLE_LEN};
