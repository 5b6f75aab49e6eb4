//! SubscriberStore trait: the abstract interface for subscription records.
//!
//! The core only reads through this trait (the ordered target list and the
//! question lookup). Mutations are issued by the command layer.

use std::sync::Arc;

use async_trait::async_trait;
use tweetwatch_core::{EntityId, Handle, TrackedEntity};

use crate::error::Result;

/// Result of inserting a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// The subscriber was inserted.
    Inserted,
    /// A subscriber with the same id or handle already exists.
    AlreadyExists,
}

/// Async interface for subscriber persistence.
///
/// # Design Notes
///
/// - **Stable order**: `list` returns subscribers in insertion order. Rule
///   packing depends on input order, so the order must not change between
///   calls.
/// - **Unique keys**: both the entity id and the handle are unique.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// All tracked entities, in insertion order.
    async fn list(&self) -> Result<Vec<TrackedEntity>>;

    /// The question stored for an entity.
    ///
    /// Fails with [`crate::StoreError::NotFound`] if the entity is not tracked.
    async fn question_for(&self, id: &EntityId) -> Result<String>;

    /// Look up an entity by id.
    async fn get(&self, id: &EntityId) -> Result<Option<TrackedEntity>>;

    /// Look up an entity by handle.
    async fn find_by_handle(&self, handle: &Handle) -> Result<Option<TrackedEntity>>;

    /// Insert a new entity.
    async fn insert(&self, entity: &TrackedEntity) -> Result<InsertResult>;

    /// Remove an entity. Returns false if it was not tracked.
    async fn remove(&self, id: &EntityId) -> Result<bool>;

    /// Number of tracked entities.
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<S: SubscriberStore + ?Sized> SubscriberStore for Arc<S> {
    async fn list(&self) -> Result<Vec<TrackedEntity>> {
        (**self).list().await
    }

    async fn question_for(&self, id: &EntityId) -> Result<String> {
        (**self).question_for(id).await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<TrackedEntity>> {
        (**self).get(id).await
    }

    async fn find_by_handle(&self, handle: &Handle) -> Result<Option<TrackedEntity>> {
        (**self).find_by_handle(handle).await
    }

    async fn insert(&self, entity: &TrackedEntity) -> Result<InsertResult> {
        (**self).insert(entity).await
    }

    async fn remove(&self, id: &EntityId) -> Result<bool> {
        (**self).remove(id).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}

/// Extension trait for common store patterns.
pub trait StoreExt: SubscriberStore {
    /// Handles of all tracked entities, in store order.
    fn handles(&self) -> impl std::future::Future<Output = Result<Vec<Handle>>> + Send;
}

impl<S: SubscriberStore + ?Sized> StoreExt for S {
    async fn handles(&self) -> Result<Vec<Handle>> {
        Ok(self.list().await?.into_iter().map(|e| e.handle).collect())
    }
}
