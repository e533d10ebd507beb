use rusqlite::params;

use super::MessageStore;
use crate::error::CacheError;
use crate::model::Message;

/// Per-conversation sync cursor state.
///
/// `last_indexed_id` is the id the cache is known to be contiguous up to; 0
/// means never synced. The `resume_*` pair is only populated while a backfill
/// is in flight: `resume_head` is the newest id the interrupted run saw, and
/// `resume_boundary` is its committed low-water mark, so a later run can pick
/// up below it instead of re-fetching pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatus {
    pub last_indexed_id: u64,
    pub resume_head: Option<u64>,
    pub resume_boundary: Option<u64>,
}

impl MessageStore {
    pub fn index_status(&self, conversation_id: &str) -> Result<IndexStatus, CacheError> {
        let conn = self.connection()?;
        let result = conn.query_row(
            "SELECT last_indexed_id, resume_head, resume_boundary
             FROM index_status WHERE conversation_id = ?1",
            params![conversation_id],
            |row| {
                Ok(IndexStatus {
                    last_indexed_id: row.get::<_, i64>(0)? as u64,
                    resume_head: row.get::<_, Option<i64>>(1)?.map(|v| v as u64),
                    resume_boundary: row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
                })
            },
        );

        match result {
            Ok(status) => Ok(status),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(IndexStatus::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Durably commit one fetched page together with its resume bookmarks.
    ///
    /// Messages and cursor state land in a single transaction, so a crash
    /// between pages leaves the bookmarks agreeing with what was stored.
    pub fn commit_page(
        &self,
        conversation_id: &str,
        messages: &[Message],
        head: u64,
        boundary: u64,
    ) -> Result<usize, CacheError> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;

        let count = Self::upsert_in_tx(&tx, messages)?;
        tx.execute(
            "INSERT INTO index_status (conversation_id, last_indexed_id, resume_head, resume_boundary)
             VALUES (?1, 0, ?2, ?3)
             ON CONFLICT(conversation_id) DO UPDATE SET
                resume_head = ?2,
                resume_boundary = ?3",
            params![conversation_id, head as i64, boundary as i64],
        )?;

        tx.commit()?;
        Ok(count)
    }

    /// Mark a sync run complete: advance the cursor to `head` and clear the
    /// resume bookmarks. The cursor only ever moves forward here.
    pub fn finish_sync(&self, conversation_id: &str, head: u64) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO index_status (conversation_id, last_indexed_id, resume_head, resume_boundary)
             VALUES (?1, ?2, NULL, NULL)
             ON CONFLICT(conversation_id) DO UPDATE SET
                last_indexed_id = MAX(last_indexed_id, ?2),
                resume_head = NULL,
                resume_boundary = NULL",
            params![conversation_id, head as i64],
        )?;
        Ok(())
    }

    /// Forget the cursor for one conversation, forcing its next sync to start
    /// from scratch. Cached messages stay in place.
    pub fn reset_index_status(&self, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM index_status WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::messages::tests::sample_message;

    #[test]
    fn test_unknown_conversation_has_default_status() {
        let store = MessageStore::in_memory().unwrap();
        assert_eq!(store.index_status("c1").unwrap(), IndexStatus::default());
    }

    #[test]
    fn test_commit_page_records_resume_bookmarks() {
        let store = MessageStore::in_memory().unwrap();
        let page = vec![sample_message("200", "c1"), sample_message("150", "c1")];

        store.commit_page("c1", &page, 200, 150).unwrap();

        let status = store.index_status("c1").unwrap();
        assert_eq!(status.last_indexed_id, 0);
        assert_eq!(status.resume_head, Some(200));
        assert_eq!(status.resume_boundary, Some(150));
        assert_eq!(store.message_count("c1").unwrap(), 2);
    }

    #[test]
    fn test_finish_sync_advances_cursor_and_clears_bookmarks() {
        let store = MessageStore::in_memory().unwrap();
        store.commit_page("c1", &[], 200, 150).unwrap();
        store.finish_sync("c1", 200).unwrap();

        let status = store.index_status("c1").unwrap();
        assert_eq!(status.last_indexed_id, 200);
        assert_eq!(status.resume_head, None);
        assert_eq!(status.resume_boundary, None);
    }

    #[test]
    fn test_cursor_never_regresses() {
        let store = MessageStore::in_memory().unwrap();
        store.finish_sync("c1", 200).unwrap();
        store.finish_sync("c1", 100).unwrap();

        assert_eq!(store.index_status("c1").unwrap().last_indexed_id, 200);
    }

    #[test]
    fn test_reset_index_status_forgets_cursor() {
        let store = MessageStore::in_memory().unwrap();
        store.finish_sync("c1", 200).unwrap();
        store.reset_index_status("c1").unwrap();

        assert_eq!(store.index_status("c1").unwrap(), IndexStatus::default());
    }
}
