#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Remote fetch failed: {0}")]
    Transient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt cache state: {0}")]
    CorruptState(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<r2d2::Error> for CacheError {
    fn from(e: r2d2::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}
