//! # tweetwatch Stream
//!
//! Keeps the remote filter rules in step with the tracked accounts and owns
//! the long-lived stream connection.
//!
//! ## Overview
//!
//! The remote service is reached through three traits in [`client`]:
//! [`RuleClient`], [`StreamClient`] and [`UserDirectory`]. [`TwitterClient`]
//! implements all of them over HTTP; [`client::memory`] provides fakes.
//!
//! On top of the rule API, [`RuleSynchronizer`] offers a full resync and
//! single-handle edits. [`StreamSession`] drives the connection lifecycle,
//! resyncing before every connect and reconnecting when the remote drops.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tweetwatch_store::MemoryStore;
//! use tweetwatch_stream::{
//!     RuleSynchronizer, SessionConfig, StreamSession, SyncConfig, TwitterClient, TwitterConfig,
//! };
//!
//! async fn example() {
//!     let client = Arc::new(TwitterClient::new(TwitterConfig::new("token")).unwrap());
//!     let synchronizer = Arc::new(RuleSynchronizer::new(Arc::clone(&client), SyncConfig::default()));
//!     let session = StreamSession::new(
//!         synchronizer,
//!         client,
//!         MemoryStore::new(),
//!         SessionConfig::default(),
//!     );
//!
//!     let mut events = session.take_events().unwrap();
//!     session.start().await.unwrap();
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event.text);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Edits replace rules**: the remote cannot modify a rule in place, so
//!   every edit is a delete followed by a create.
//! - **Foreign rules**: rules that are not `from:` disjunctions are never
//!   edited, but a resync removes them.
//! - **Pack before write**: a resync that cannot fit the tracked set fails
//!   before touching the remote.

pub mod client;
pub mod convergence;
pub mod error;
pub mod http;
pub mod session;
pub mod synchronizer;

pub use client::{EventSource, RuleClient, StreamClient, StreamRequest, UserDirectory};
pub use convergence::{fingerprint, verify_rule_set, ConvergenceResult, RuleSetFingerprint};
pub use error::{Result, StreamError};
pub use http::{TwitterClient, TwitterConfig};
pub use session::{SessionConfig, SessionState, SessionStatus, StreamSession};
pub use synchronizer::{AddOutcome, RemoveOutcome, RuleSynchronizer, SyncConfig, SyncReport};
