//! In-memory implementation of the SubscriberStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tweetwatch_core::{EntityId, Handle, TrackedEntity};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, SubscriberStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    /// Entities in insertion order.
    entities: RwLock<Vec<TrackedEntity>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entities, skipping duplicates.
    pub fn with_entities(entities: impl IntoIterator<Item = TrackedEntity>) -> Self {
        let mut unique: Vec<TrackedEntity> = Vec::new();
        for entity in entities {
            if !unique
                .iter()
                .any(|e| e.id == entity.id || e.handle == entity.handle)
            {
                unique.push(entity);
            }
        }
        Self {
            entities: RwLock::new(unique),
        }
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn list(&self) -> Result<Vec<TrackedEntity>> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entities.clone())
    }

    async fn question_for(&self, id: &EntityId) -> Result<String> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.question.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &EntityId) -> Result<Option<TrackedEntity>> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entities.iter().find(|e| &e.id == id).cloned())
    }

    async fn find_by_handle(&self, handle: &Handle) -> Result<Option<TrackedEntity>> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entities.iter().find(|e| &e.handle == handle).cloned())
    }

    async fn insert(&self, entity: &TrackedEntity) -> Result<InsertResult> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);

        if entities
            .iter()
            .any(|e| e.id == entity.id || e.handle == entity.handle)
        {
            return Ok(InsertResult::AlreadyExists);
        }

        entities.push(entity.clone());
        Ok(InsertResult::Inserted)
    }

    async fn remove(&self, id: &EntityId) -> Result<bool> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        let before = entities.len();
        entities.retain(|e| &e.id != id);
        Ok(entities.len() != before)
    }

    async fn count(&self) -> Result<usize> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entities.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;

    fn entity(handle: &str, id: &str) -> TrackedEntity {
        TrackedEntity::new(Handle::new(handle).unwrap(), EntityId::new(id), "Is it about Rust?")
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        let result = store.insert(&entity("ann", "1")).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let question = store.question_for(&EntityId::new("1")).await.unwrap();
        assert_eq!(question, "Is it about Rust?");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_unique_keys() {
        let store = MemoryStore::new();
        store.insert(&entity("ann", "1")).await.unwrap();

        // Same handle, different id
        let r = store.insert(&entity("ann", "2")).await.unwrap();
        assert_eq!(r, InsertResult::AlreadyExists);

        // Same id, different handle
        let r = store.insert(&entity("bob", "1")).await.unwrap();
        assert_eq!(r, InsertResult::AlreadyExists);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_insertion_order() {
        let store = MemoryStore::with_entities([entity("zed", "3"), entity("ann", "1"), entity("bob", "2")]);
        let handles: Vec<String> = store
            .handles()
            .await
            .unwrap()
            .iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(handles, vec!["zed", "ann", "bob"]);
    }

    #[tokio::test]
    async fn test_memory_store_remove_and_missing_question() {
        let store = MemoryStore::with_entities([entity("ann", "1")]);

        assert!(store.remove(&EntityId::new("1")).await.unwrap());
        assert!(!store.remove(&EntityId::new("1")).await.unwrap());

        let missing = store.question_for(&EntityId::new("1")).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
