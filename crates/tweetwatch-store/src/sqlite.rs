//! SQLite implementation of the SubscriberStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use tweetwatch_core::{EntityId, Handle, TrackedEntity};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{InsertResult, SubscriberStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

type RawRow = (String, String, String);

const SELECT_COLUMNS: &str = "SELECT entity_id, handle, question FROM subscribers";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get("entity_id")?, row.get("handle")?, row.get("question")?))
}

fn into_entity((id, handle, question): RawRow) -> Result<TrackedEntity> {
    let handle = Handle::new(&handle)
        .map_err(|e| StoreError::InvalidData(format!("stored handle {:?}: {}", handle, e)))?;
    Ok(TrackedEntity::new(handle, EntityId::new(id), question))
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn list(&self) -> Result<Vec<TrackedEntity>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY seq", SELECT_COLUMNS))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(into_entity).collect()
        })
        .await
    }

    async fn question_for(&self, id: &EntityId) -> Result<String> {
        let id = id.clone();
        self.run(move |conn| {
            conn.query_row(
                "SELECT question FROM subscribers WHERE entity_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<TrackedEntity>> {
        let id = id.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!("{} WHERE entity_id = ?1", SELECT_COLUMNS),
                params![id.as_str()],
                read_row,
            )
            .optional()?
            .map(into_entity)
            .transpose()
        })
        .await
    }

    async fn find_by_handle(&self, handle: &Handle) -> Result<Option<TrackedEntity>> {
        let handle = handle.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!("{} WHERE handle = ?1", SELECT_COLUMNS),
                params![handle.as_str()],
                read_row,
            )
            .optional()?
            .map(into_entity)
            .transpose()
        })
        .await
    }

    async fn insert(&self, entity: &TrackedEntity) -> Result<InsertResult> {
        let entity = entity.clone();
        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM subscribers WHERE entity_id = ?1 OR handle = ?2)",
                params![entity.id.as_str(), entity.handle.as_str()],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(InsertResult::AlreadyExists);
            }

            conn.execute(
                "INSERT INTO subscribers (entity_id, handle, question, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entity.id.as_str(),
                    entity.handle.as_str(),
                    entity.question,
                    now_millis(),
                ],
            )?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn remove(&self, id: &EntityId) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM subscribers WHERE entity_id = ?1",
                params![id.as_str()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}
