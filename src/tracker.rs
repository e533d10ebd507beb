//! Unread tracking for conversations.
//!
//! The remote reports a live total message count per conversation; the cache
//! persists the count the user last acknowledged. Unread is the difference,
//! plus an in-memory optimistic bump for messages that arrived over a push
//! channel before the next poll refreshes the live total.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::CacheError;
use crate::store::MessageStore;

#[derive(Debug, Default)]
struct Overlay {
    /// The live total the optimistic count was accumulated against.
    observed_total: Option<u64>,
    /// Pushed messages not yet reflected in the live total.
    optimistic: u64,
}

pub struct ConversationTracker {
    store: Arc<MessageStore>,
    overlay: Mutex<HashMap<String, Overlay>>,
}

impl ConversationTracker {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            store,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Unread count given the remote's current live total.
    ///
    /// A conversation seen for the first time starts read: its baseline is
    /// persisted at the live total and 0 is returned. When the live total has
    /// moved since optimistic bumps were recorded, the poll has caught up
    /// with the pushed messages, so the overlay is discarded rather than
    /// double-counted.
    pub fn unread_count(&self, conversation_id: &str, live_total: u64) -> Result<u64, CacheError> {
        let last_seen = match self.store.last_seen_count(conversation_id)? {
            Some(count) => count,
            None => {
                debug!("First encounter with conversation {}", conversation_id);
                self.store.set_last_seen_count(conversation_id, live_total)?;
                let mut overlay = self.overlay.lock().unwrap();
                overlay.insert(
                    conversation_id.to_string(),
                    Overlay {
                        observed_total: Some(live_total),
                        optimistic: 0,
                    },
                );
                return Ok(0);
            }
        };

        let mut overlay = self.overlay.lock().unwrap();
        let entry = overlay.entry(conversation_id.to_string()).or_default();
        if entry.observed_total != Some(live_total) {
            entry.observed_total = Some(live_total);
            entry.optimistic = 0;
        }

        Ok(live_total.saturating_sub(last_seen) + entry.optimistic)
    }

    /// The user has caught up with the conversation.
    pub fn mark_read(&self, conversation_id: &str, live_total: u64) -> Result<(), CacheError> {
        self.store.set_last_seen_count(conversation_id, live_total)?;
        let mut overlay = self.overlay.lock().unwrap();
        overlay.insert(
            conversation_id.to_string(),
            Overlay {
                observed_total: Some(live_total),
                optimistic: 0,
            },
        );
        Ok(())
    }

    /// A message arrived over a push channel; the live total will lag until
    /// the next poll, so count it immediately.
    pub fn note_new_message(&self, conversation_id: &str) {
        let mut overlay = self.overlay.lock().unwrap();
        overlay
            .entry(conversation_id.to_string())
            .or_default()
            .optimistic += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConversationTracker {
        ConversationTracker::new(Arc::new(MessageStore::in_memory().unwrap()))
    }

    #[test]
    fn test_first_encounter_starts_read() {
        let t = tracker();
        assert_eq!(t.unread_count("c1", 120).unwrap(), 0);
        // Baseline was persisted, so growth from here shows up
        assert_eq!(t.unread_count("c1", 125).unwrap(), 5);
    }

    #[test]
    fn test_mark_read_clears_unread() {
        let t = tracker();
        t.unread_count("c1", 100).unwrap();
        assert_eq!(t.unread_count("c1", 107).unwrap(), 7);

        t.mark_read("c1", 107).unwrap();
        assert_eq!(t.unread_count("c1", 107).unwrap(), 0);
    }

    #[test]
    fn test_pushed_messages_count_immediately() {
        let t = tracker();
        t.mark_read("c1", 100).unwrap();

        t.note_new_message("c1");
        t.note_new_message("c1");
        t.note_new_message("c1");

        // Live total still lags at 100
        assert_eq!(t.unread_count("c1", 100).unwrap(), 3);
    }

    #[test]
    fn test_poll_catchup_discards_optimistic_overlay() {
        let t = tracker();
        t.mark_read("c1", 100).unwrap();

        t.note_new_message("c1");
        t.note_new_message("c1");
        assert_eq!(t.unread_count("c1", 100).unwrap(), 2);

        // The poll now reports the pushed messages in the live total; the
        // overlay must not double-count them.
        assert_eq!(t.unread_count("c1", 102).unwrap(), 2);
    }

    #[test]
    fn test_shrinking_live_total_saturates_at_zero() {
        let t = tracker();
        t.mark_read("c1", 100).unwrap();
        // Remote-side deletions can shrink the total below the baseline
        assert_eq!(t.unread_count("c1", 95).unwrap(), 0);
    }

    #[test]
    fn test_baseline_survives_tracker_restart() {
        let store = Arc::new(MessageStore::in_memory().unwrap());
        let t = ConversationTracker::new(store.clone());
        t.mark_read("c1", 100).unwrap();
        drop(t);

        let t = ConversationTracker::new(store);
        assert_eq!(t.unread_count("c1", 104).unwrap(), 4);
    }
}
