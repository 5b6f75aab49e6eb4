//! # tweetwatch
//!
//! Track accounts on a filtered post stream and get notified when one of
//! their posts answers your question.
//!
//! ## Overview
//!
//! tweetwatch provides:
//!
//! - **Subscriptions**: a handle plus a natural-language question, stored in
//!   a [`SubscriberStore`](store::SubscriberStore)
//! - **Rule packing**: all tracked handles squeezed into the remote service's
//!   bounded set of `from:<handle> OR ...` filter rules
//! - **Streaming**: one long-lived connection with resync-and-reconnect
//! - **Matching**: each post is put to a [`Classifier`] together with its
//!   author's question; affirmative answers go to a [`NotificationSink`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tweetwatch::{ClassifierConfig, LogSink, OpenAiClassifier, Tracker, TrackerConfig};
//! use tweetwatch::store::SqliteStore;
//! use tweetwatch::stream::{TwitterClient, TwitterConfig};
//!
//! async fn example() {
//!     let twitter = TwitterClient::new(TwitterConfig::new("bearer-token")).unwrap();
//!     let store = SqliteStore::open("tweetwatch.db").unwrap();
//!
//!     let tracker = Tracker::new(
//!         twitter.clone(),
//!         twitter.clone(),
//!         twitter,
//!         store,
//!         TrackerConfig::default(),
//!     );
//!
//!     tracker
//!         .subscribe("rustlang", "Does this announce a new Rust release?")
//!         .await
//!         .unwrap();
//!
//!     let classifier = OpenAiClassifier::new(ClassifierConfig::new("sk-...")).unwrap();
//!     let events = tracker.take_events().unwrap();
//!     tracker.start().await.unwrap();
//!     tracker.pipeline(classifier).run(events, &LogSink).await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tweetwatch::core` - Handles, rules, packing, events
//! - `tweetwatch::store` - Subscriber storage and SQLite
//! - `tweetwatch::stream` - Remote clients, rule synchronizer, stream session

pub mod classifier;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod tracker;

// Re-export component crates
pub use tweetwatch_core as core;
pub use tweetwatch_store as store;
pub use tweetwatch_stream as stream;

// Re-export main types for convenience
pub use classifier::{compose_prompt, Classifier, ClassifierConfig, OpenAiClassifier};
pub use config::TrackerConfig;
pub use error::{ClassifierError, PipelineError, Result, SinkError, TrackerError};
pub use notify::{ChannelSink, LogSink, Notification, NotificationSink, WebhookSink};
pub use pipeline::{MatchingPipeline, PipelineConfig, PipelineStats, ProcessOutcome};
pub use retry::{RetryPolicy, RetryingClassifier};
pub use tracker::Tracker;

pub use tweetwatch_core::{
    is_affirmative, Handle, MatchResult, RuleLimits, StreamEvent, TrackedEntity,
};
pub use tweetwatch_stream::{SessionState, SessionStatus};
