use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::CacheError;

/// Bump when adding tables or columns. Evolution is additive only, so an
/// upgrade never drops previously cached messages or cursors.
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version         INTEGER NOT NULL
    );

    -- Raw message store (cache of remote data)
    CREATE TABLE IF NOT EXISTS messages (
        id              TEXT PRIMARY KEY,   -- remote message id (numeric string)
        id_num          INTEGER NOT NULL,   -- numeric form, for ordering
        conversation_id TEXT NOT NULL,
        group_id        TEXT,
        sender_id       TEXT NOT NULL,
        sender_name     TEXT,
        avatar_url      TEXT,
        created_at      INTEGER NOT NULL,   -- unix epoch seconds
        text            TEXT,
        attachments     TEXT NOT NULL DEFAULT '[]',  -- JSON array
        fetched_at      INTEGER NOT NULL    -- unix epoch ms
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id_num);
    CREATE INDEX IF NOT EXISTS idx_messages_sender       ON messages(conversation_id, sender_id);

    -- Liker sets live apart from the otherwise-immutable message rows and
    -- are joined back in at query time.
    CREATE TABLE IF NOT EXISTS likers (
        message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        liker_id        TEXT NOT NULL,
        PRIMARY KEY (message_id, liker_id)
    );

    -- Per-conversation sync cursors.
    -- last_indexed_id is the caught-up-to boundary; the resume_* pair tracks
    -- an in-progress backfill so an interrupted sync continues below its
    -- committed low-water mark instead of re-fetching pages.
    CREATE TABLE IF NOT EXISTS index_status (
        conversation_id TEXT PRIMARY KEY,
        last_indexed_id INTEGER NOT NULL DEFAULT 0,
        resume_head     INTEGER,
        resume_boundary INTEGER
    );

    -- Read-state: the total message count last seen by the user.
    CREATE TABLE IF NOT EXISTS conversation_state (
        conversation_id TEXT PRIMARY KEY,
        last_seen_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS hidden_messages (
        message_id      TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS starred_messages (
        message_id      TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL
    );
";

pub fn initialize(conn: &Connection) -> Result<(), CacheError> {
    // A database that fails the integrity check is unusable; callers must
    // migrate or reset it out of band.
    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        return Err(CacheError::CorruptState(format!(
            "Integrity check failed: {}",
            check
        )));
    }

    conn.execute_batch(CREATE_TABLES)?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    match version {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            info!("Cache schema created (version {})", SCHEMA_VERSION);
        }
        Some(v) if v > SCHEMA_VERSION => {
            return Err(CacheError::CorruptState(format!(
                "Cache schema version {} is newer than supported version {}",
                v, SCHEMA_VERSION
            )));
        }
        Some(v) if v < SCHEMA_VERSION => {
            // Additive migrations run here as the schema grows.
            conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![SCHEMA_VERSION],
            )?;
            info!("Cache schema migrated from version {} to {}", v, SCHEMA_VERSION);
        }
        Some(v) => {
            debug!("Cache schema version: {}", v);
        }
    }

    Ok(())
}
