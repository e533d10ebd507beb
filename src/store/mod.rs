//! SQLite persistence for the message cache.
//!
//! The database is a cache of remote state. Everything in it can be rebuilt
//! by re-syncing, so `reset()` is always a safe (if expensive) escape hatch.

mod index_status;
pub(crate) mod messages;
mod schema;
mod state;

pub use index_status::IndexStatus;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::error::CacheError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Handle to the message cache database.
///
/// Cheap to share behind an `Arc`; the pool closes when the last handle
/// drops. The sync engine is the sole writer; readers go through the same
/// pool. WAL mode keeps them from blocking each other, and page commits are
/// transactional so a reader never observes a partially-written page.
pub struct MessageStore {
    pool: DbPool,
}

impl MessageStore {
    /// Open (or create) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        Self::from_manager(SqliteConnectionManager::file(path), 8)
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_manager(SqliteConnectionManager::memory(), 1)
    }

    fn from_manager(manager: SqliteConnectionManager, max_size: u32) -> Result<Self, CacheError> {
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        let store = Self { pool };

        let conn = store.connection()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        schema::initialize(&conn)?;

        Ok(store)
    }

    pub(crate) fn connection(&self) -> Result<DbConnection, CacheError> {
        self.pool.get().map_err(Into::into)
    }

    /// Explicit cache clear: drops all cached messages, cursors and
    /// read-state. The only operation allowed to regress a sync cursor.
    pub fn reset(&self) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "DELETE FROM likers;
             DELETE FROM messages;
             DELETE FROM index_status;
             DELETE FROM conversation_state;
             DELETE FROM hidden_messages;
             DELETE FROM starred_messages;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let store = MessageStore::in_memory().expect("Failed to create in-memory store");
        let conn = store.connection().expect("Failed to get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"likers".to_string()));
        assert!(tables.contains(&"index_status".to_string()));
        assert!(tables.contains(&"conversation_state".to_string()));
        assert!(tables.contains(&"hidden_messages".to_string()));
        assert!(tables.contains(&"starred_messages".to_string()));
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = MessageStore::open(&path).expect("Failed to open store");
            store
                .upsert_messages(&[crate::store::messages::tests::sample_message("10", "c1")])
                .unwrap();
            store.finish_sync("c1", 10).unwrap();
        }

        let store = MessageStore::open(&path).expect("Failed to reopen store");
        assert!(store.get_message("10").unwrap().is_some());
        assert_eq!(store.index_status("c1").unwrap().last_indexed_id, 10);
    }
}
