use rusqlite::{params, Connection, Row, ToSql};

use super::MessageStore;
use crate::error::CacheError;
use crate::model::{parse_message_id, Message};
use crate::query::{MessageFilter, SortOrder};

const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.group_id, m.sender_id, m.sender_name,
        m.avatar_url, m.created_at, m.text, m.attachments,
        (SELECT group_concat(l.liker_id) FROM likers l WHERE l.message_id = m.id)";

impl MessageStore {
    /// Insert or overwrite a batch of messages in one transaction.
    ///
    /// Idempotent: a message with an existing id overwrites the mutable
    /// fields (notably the liker set) in place, never duplicating the row.
    /// Returns the number of rows written.
    pub fn upsert_messages(&self, messages: &[Message]) -> Result<usize, CacheError> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let count = Self::upsert_in_tx(&tx, messages)?;
        tx.commit()?;
        Ok(count)
    }

    /// Upsert within a caller-managed transaction, so page commits can bundle
    /// message rows with cursor bookkeeping atomically.
    pub(crate) fn upsert_in_tx(conn: &Connection, messages: &[Message]) -> Result<usize, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut count = 0;

        for msg in messages {
            let id_num = parse_message_id(&msg.id)? as i64;
            let attachments = serde_json::to_string(&msg.attachments)
                .map_err(|e| CacheError::InvalidInput(format!("Unencodable attachments: {}", e)))?;

            conn.execute(
                "INSERT INTO messages (
                    id, id_num, conversation_id, group_id, sender_id,
                    sender_name, avatar_url, created_at, text, attachments, fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    attachments = excluded.attachments,
                    fetched_at = excluded.fetched_at",
                params![
                    msg.id,
                    id_num,
                    msg.conversation_id,
                    msg.group_id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.avatar_url,
                    msg.created_at,
                    msg.text,
                    attachments,
                    now,
                ],
            )?;

            // Replace the liker set in place
            conn.execute("DELETE FROM likers WHERE message_id = ?1", params![msg.id])?;
            for liker in &msg.likers {
                conn.execute(
                    "INSERT OR IGNORE INTO likers (message_id, liker_id) VALUES (?1, ?2)",
                    params![msg.id, liker],
                )?;
            }

            count += 1;
        }

        Ok(count)
    }

    /// Fetch a single message by id.
    pub fn get_message(&self, id: &str) -> Result<Option<Message>, CacheError> {
        let conn = self.connection()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS),
            params![id],
            row_to_message,
        );

        match result {
            Ok(msg) => Ok(Some(msg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of cached messages in a conversation.
    pub fn message_count(&self, conversation_id: &str) -> Result<u64, CacheError> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Filtered, ordered, paginated read over the cache.
    ///
    /// Filters are ANDed; ordering is by numeric id, which matches
    /// chronological order since the remote issues ids monotonically. The
    /// result is re-sorted here regardless of insertion order, so readers see
    /// id order no matter how sync interleaved its page fetches.
    pub fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, CacheError> {
        let (where_sql, mut values) = filter_sql(filter);
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };

        let sql = format!(
            "SELECT {} FROM messages m WHERE {} ORDER BY m.id_num {} LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS, where_sql, direction
        );
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(bind.as_slice(), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Position of a message within the filtered, ordered result set, or
    /// `None` if the message does not match the filter.
    pub(crate) fn rank_in_filter(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        message_id: &str,
    ) -> Result<Option<u64>, CacheError> {
        let target = parse_message_id(message_id)? as i64;
        let conn = self.connection()?;

        let (where_sql, values) = filter_sql(filter);
        let bind: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

        // The target itself must be part of the result set
        let member_sql = format!(
            "SELECT COUNT(*) FROM messages m WHERE {} AND m.id_num = {}",
            where_sql, target
        );
        let is_member: i64 = conn.query_row(&member_sql, bind.as_slice(), |row| row.get(0))?;
        if is_member == 0 {
            return Ok(None);
        }

        let comparison = match order {
            SortOrder::Ascending => "<",
            SortOrder::Descending => ">",
        };
        let rank_sql = format!(
            "SELECT COUNT(*) FROM messages m WHERE {} AND m.id_num {} {}",
            where_sql, comparison, target
        );
        let rank: i64 = conn.query_row(&rank_sql, bind.as_slice(), |row| row.get(0))?;
        Ok(Some(rank as u64))
    }
}

/// Build the WHERE clause for a filter. All criteria are ANDed.
fn filter_sql(filter: &MessageFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = vec!["m.conversation_id = ?".to_string()];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(filter.conversation_id.clone())];

    if let Some(since) = filter.since {
        clauses.push("m.created_at >= ?".to_string());
        values.push(Box::new(since));
    }
    if let Some(until) = filter.until {
        clauses.push("m.created_at <= ?".to_string());
        values.push(Box::new(until));
    }
    if let Some(ref sender) = filter.sender_id {
        clauses.push("m.sender_id = ?".to_string());
        values.push(Box::new(sender.clone()));
    }
    if let Some(kind) = filter.has_attachment {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(m.attachments)
                     WHERE json_extract(json_each.value, '$.type') = ?)"
                .to_string(),
        );
        values.push(Box::new(kind.discriminant().to_string()));
    }
    if let Some(ref needle) = filter.text_contains {
        clauses.push("m.text IS NOT NULL AND instr(lower(m.text), lower(?)) > 0".to_string());
        values.push(Box::new(needle.clone()));
    }

    (clauses.join(" AND "), values)
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let attachments_json: String = row.get(8)?;
    let likers_concat: Option<String> = row.get(9)?;

    let mut likers: Vec<String> = likers_concat
        .map(|s| s.split(',').map(|p| p.to_string()).collect())
        .unwrap_or_default();
    likers.sort();

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        group_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        avatar_url: row.get(5)?,
        created_at: row.get(6)?,
        text: row.get(7)?,
        attachments: serde_json::from_str(&attachments_json).unwrap_or_default(),
        likers,
    })
}
