use rusqlite::params;

use super::MessageStore;
use crate::error::CacheError;

impl MessageStore {
    /// The total message count last acknowledged by the user, or `None` if
    /// the conversation has never been seen.
    pub fn last_seen_count(&self, conversation_id: &str) -> Result<Option<u64>, CacheError> {
        let conn = self.connection()?;
        let result = conn.query_row(
            "SELECT last_seen_count FROM conversation_state WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get::<_, i64>(0),
        );

        match result {
            Ok(count) => Ok(Some(count as u64)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_last_seen_count(&self, conversation_id: &str, count: u64) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO conversation_state (conversation_id, last_seen_count)
             VALUES (?1, ?2)
             ON CONFLICT(conversation_id) DO UPDATE SET last_seen_count = ?2",
            params![conversation_id, count as i64],
        )?;
        Ok(())
    }

    /// Flag a message as hidden. Metadata only: queries still return the
    /// message, presentation layers decide what to do with the flag.
    pub fn hide_message(&self, message_id: &str, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO hidden_messages (message_id, conversation_id) VALUES (?1, ?2)",
            params![message_id, conversation_id],
        )?;
        Ok(())
    }

    /// Returns whether the message was actually hidden.
    pub fn unhide_message(&self, message_id: &str) -> Result<bool, CacheError> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "DELETE FROM hidden_messages WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(changed > 0)
    }

    pub fn hidden_messages(&self, conversation_id: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT message_id FROM hidden_messages WHERE conversation_id = ?1 ORDER BY message_id",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn star_message(&self, message_id: &str, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO starred_messages (message_id, conversation_id) VALUES (?1, ?2)",
            params![message_id, conversation_id],
        )?;
        Ok(())
    }

    /// Returns whether the message was actually starred.
    pub fn unstar_message(&self, message_id: &str) -> Result<bool, CacheError> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "DELETE FROM starred_messages WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(changed > 0)
    }

    pub fn starred_messages(&self, conversation_id: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT message_id FROM starred_messages WHERE conversation_id = ?1 ORDER BY message_id",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_seen_count_roundtrip() {
        let store = MessageStore::in_memory().unwrap();
        assert_eq!(store.last_seen_count("c1").unwrap(), None);

        store.set_last_seen_count("c1", 42).unwrap();
        assert_eq!(store.last_seen_count("c1").unwrap(), Some(42));

        store.set_last_seen_count("c1", 50).unwrap();
        assert_eq!(store.last_seen_count("c1").unwrap(), Some(50));
    }

    #[test]
    fn test_hide_and_unhide() {
        let store = MessageStore::in_memory().unwrap();

        store.hide_message("5", "c1").unwrap();
        store.hide_message("5", "c1").unwrap();
        store.hide_message("3", "c1").unwrap();
        store.hide_message("9", "c2").unwrap();

        assert_eq!(
            store.hidden_messages("c1").unwrap(),
            vec!["3".to_string(), "5".to_string()]
        );

        assert!(store.unhide_message("5").unwrap());
        assert!(!store.unhide_message("5").unwrap());
        assert_eq!(store.hidden_messages("c1").unwrap(), vec!["3".to_string()]);
    }

    #[test]
    fn test_star_and_unstar() {
        let store = MessageStore::in_memory().unwrap();

        store.star_message("7", "c1").unwrap();
        assert_eq!(store.starred_messages("c1").unwrap(), vec!["7".to_string()]);

        assert!(store.unstar_message("7").unwrap());
        assert!(!store.unstar_message("7").unwrap());
        assert!(store.starred_messages("c1").unwrap().is_empty());
    }
}
