//! Paged, filtered read access over the cached messages.

use std::sync::Arc;

use crate::error::CacheError;
use crate::model::{AttachmentKind, Message};
use crate::store::MessageStore;

/// Fixed UI page size.
pub const PAGE_SIZE: usize = 100;

/// Criteria for selecting messages within one conversation. All populated
/// fields must match (AND semantics).
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub conversation_id: String,
    /// Inclusive lower bound on `created_at` (epoch seconds).
    pub since: Option<i64>,
    /// Inclusive upper bound on `created_at` (epoch seconds).
    pub until: Option<i64>,
    pub sender_id: Option<String>,
    pub has_attachment: Option<AttachmentKind>,
    /// Case-insensitive substring match on the message text.
    pub text_contains: Option<String>,
}

impl MessageFilter {
    pub fn conversation(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A paged view over a filtered slice of the cache.
///
/// The view holds no messages itself; every page flip re-queries the store,
/// so results reflect whatever sync has committed by then.
pub struct MessageView {
    store: Arc<MessageStore>,
    filter: MessageFilter,
    order: SortOrder,
    page: usize,
}

impl MessageView {
    pub fn new(store: Arc<MessageStore>, filter: MessageFilter, order: SortOrder) -> Self {
        Self {
            store,
            filter,
            order,
            page: 0,
        }
    }

    /// The current page index (0-based).
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    /// Replace the filter and jump back to the first page.
    pub fn set_filter(&mut self, filter: MessageFilter) -> Result<Vec<Message>, CacheError> {
        self.filter = filter;
        self.change_page(0)
    }

    /// Load page `n` of the filtered result set. Pages past the end are
    /// simply empty.
    pub fn change_page(&mut self, n: usize) -> Result<Vec<Message>, CacheError> {
        self.page = n;
        self.store
            .query_messages(&self.filter, self.order, PAGE_SIZE, n * PAGE_SIZE)
    }

    /// Jump to the page containing `message_id` and return it.
    ///
    /// Fails with `NotFound` when the message is not cached or does not
    /// match the current filter.
    pub fn ensure_visible(&mut self, message_id: &str) -> Result<(usize, Vec<Message>), CacheError> {
        let rank = self
            .store
            .rank_in_filter(&self.filter, self.order, message_id)?
            .ok_or_else(|| {
                CacheError::NotFound(format!("Message {} not in filtered view", message_id))
            })?;

        let page = rank as usize / PAGE_SIZE;
        let messages = self.change_page(page)?;
        Ok((page, messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::messages::tests::sample_message;

    fn seeded_store(count: u64) -> Arc<MessageStore> {
        let store = MessageStore::in_memory().unwrap();
        let messages: Vec<Message> = (1..=count)
            .map(|i| sample_message(&i.to_string(), "c1"))
            .collect();
        store.upsert_messages(&messages).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_page_slices() {
        let store = seeded_store(250);
        let mut view = MessageView::new(
            store,
            MessageFilter::conversation("c1"),
            SortOrder::Ascending,
        );

        let page = view.change_page(0).unwrap();
        assert_eq!(page.len(), 100);
        assert_eq!(page[0].id, "1");
        assert_eq!(page[99].id, "100");

        let page = view.change_page(2).unwrap();
        assert_eq!(page.len(), 50);
        assert_eq!(page[0].id, "201");
        assert_eq!(view.page(), 2);

        assert!(view.change_page(3).unwrap().is_empty());
    }

    #[test]
    fn test_descending_pages_newest_first() {
        let store = seeded_store(150);
        let mut view = MessageView::new(
            store,
            MessageFilter::conversation("c1"),
            SortOrder::Descending,
        );

        let page = view.change_page(0).unwrap();
        assert_eq!(page[0].id, "150");
        assert_eq!(page[99].id, "51");
    }

    #[test]
    fn test_ensure_visible_lands_on_containing_page() {
        let store = seeded_store(250);
        let mut view = MessageView::new(
            store,
            MessageFilter::conversation("c1"),
            SortOrder::Ascending,
        );

        let (page, messages) = view.ensure_visible("205").unwrap();
        assert_eq!(page, 2);
        assert_eq!(view.page(), 2);
        assert!(messages.iter().any(|m| m.id == "205"));

        // In descending order the same message ranks near the front
        let store = seeded_store(250);
        let mut view = MessageView::new(
            store,
            MessageFilter::conversation("c1"),
            SortOrder::Descending,
        );
        let (page, messages) = view.ensure_visible("205").unwrap();
        assert_eq!(page, 0);
        assert!(messages.iter().any(|m| m.id == "205"));
    }

    #[test]
    fn test_ensure_visible_respects_filter() {
        let store = seeded_store(50);
        let mut filter = MessageFilter::conversation("c1");
        filter.sender_id = Some("nobody".to_string());
        let mut view = MessageView::new(store, filter, SortOrder::Ascending);

        match view.ensure_visible("10") {
            Err(CacheError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other.map(|(p, _)| p)),
        }
    }

    #[test]
    fn test_set_filter_resets_to_first_page() {
        let store = seeded_store(250);
        let mut view = MessageView::new(
            store,
            MessageFilter::conversation("c1"),
            SortOrder::Ascending,
        );
        view.change_page(2).unwrap();

        let mut filter = MessageFilter::conversation("c1");
        filter.since = Some(1_600_000_200);
        let page = view.set_filter(filter).unwrap();

        assert_eq!(view.page(), 0);
        assert_eq!(page.len(), 51);
        assert_eq!(page[0].id, "200");
    }
}
