use async_trait::async_trait;

use crate::error::CacheError;
use crate::model::Message;

/// The remote messaging service, as far as the cache is concerned.
///
/// The service only supports backward retrieval: the newest page, or the page
/// strictly older than a given id. Pages come back newest-first, bounded by a
/// server-side page size. An empty page signals no more data in that
/// direction.
///
/// Implementations map their transport failures to `CacheError::Transient`;
/// the sync engine does not retry internally.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// The newest messages of a conversation.
    async fn fetch_latest(&self, conversation_id: &str) -> Result<Vec<Message>, CacheError>;

    /// Messages strictly older than `before_id`.
    async fn fetch_before(
        &self,
        conversation_id: &str,
        before_id: &str,
    ) -> Result<Vec<Message>, CacheError>;
}
