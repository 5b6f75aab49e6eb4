//! # tweetwatch Store
//!
//! Storage abstraction for tracked subscribers. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store abstracts subscription records behind the [`SubscriberStore`]
//! trait, so the synchronizer, session and pipeline are storage-agnostic.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! testing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tweetwatch_store::{SqliteStore, SubscriberStore};
//! use tweetwatch_core::{EntityId, Handle, TrackedEntity};
//!
//! async fn example() {
//!     let store = SqliteStore::open("tweetwatch.db").unwrap();
//!
//!     let entity = TrackedEntity::new(
//!         Handle::new("rustlang").unwrap(),
//!         EntityId::new("165262"),
//!         "Does this announce a new Rust release?",
//!     );
//!     store.insert(&entity).await.unwrap();
//!
//!     let question = store.question_for(&entity.id).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Insertion order**: `list` is ordered, because rule packing is
//!   order-sensitive.
//! - **Unique keys**: inserting a known id or handle returns `AlreadyExists`.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, StoreExt, SubscriberStore};
