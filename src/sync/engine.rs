use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::model::{parse_message_id, Message};
use crate::remote::MessageSource;
use crate::store::MessageStore;

/// Cooperative cancellation flag for one sync run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Caught up. `new_messages` counts messages above the previous cursor
    /// fetched and committed by this run.
    Complete { new_messages: usize },
    /// The conversation has no messages at all.
    Empty,
    /// Stopped early at a page boundary; committed progress is kept and the
    /// next run resumes from it.
    Cancelled,
}

/// Progress notifications, delivered over the channel returned by
/// [`SyncEngine::new`].
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started { conversation_id: String },
    PageCommitted { conversation_id: String, committed: usize },
    Completed { conversation_id: String, new_messages: usize },
    Cancelled { conversation_id: String },
    Failed { conversation_id: String, error: String },
}

struct SyncSlot {
    token: CancelToken,
    /// Serializes runs for one conversation, so a restart waits for the
    /// cancelled run to stop at its page boundary before taking over.
    serial: Arc<tokio::sync::Mutex<()>>,
}

/// Backward-paginating sync over a [`MessageSource`].
///
/// One engine serves many conversations. Per conversation, at most one run is
/// active: starting a new run cancels and replaces the old one. Every fetched
/// page is committed durably together with resume bookmarks, so cancellation
/// and crashes cost at most one page of re-fetching.
pub struct SyncEngine {
    store: Arc<MessageStore>,
    source: Arc<dyn MessageSource>,
    slots: Mutex<HashMap<String, SyncSlot>>,
    events_tx: flume::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<MessageStore>,
        source: Arc<dyn MessageSource>,
    ) -> (Self, flume::Receiver<SyncEvent>) {
        let (events_tx, events_rx) = flume::unbounded();
        (
            Self {
                store,
                source,
                slots: Mutex::new(HashMap::new()),
                events_tx,
            },
            events_rx,
        )
    }

    /// Cancel the in-flight run for a conversation, if any. The run stops at
    /// its next page boundary.
    pub fn cancel(&self, conversation_id: &str) {
        let slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get(conversation_id) {
            slot.token.cancel();
        }
    }

    /// Bring one conversation up to date.
    ///
    /// If a run is already active for this conversation it is cancelled, and
    /// this call waits for it to stop before starting over against the
    /// cursors it left behind.
    pub async fn sync_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<SyncOutcome, CacheError> {
        let (token, serial) = {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots
                .entry(conversation_id.to_string())
                .or_insert_with(|| SyncSlot {
                    token: CancelToken::new(),
                    serial: Arc::new(tokio::sync::Mutex::new(())),
                });
            slot.token.cancel();
            slot.token = CancelToken::new();
            (slot.token.clone(), slot.serial.clone())
        };

        let _guard = serial.lock().await;
        if token.is_cancelled() {
            // Superseded while waiting for the previous run to stop
            return Ok(SyncOutcome::Cancelled);
        }

        let _ = self.events_tx.send(SyncEvent::Started {
            conversation_id: conversation_id.to_string(),
        });

        let result = self.run_sync(conversation_id, &token).await;
        match &result {
            Ok(SyncOutcome::Complete { new_messages }) => {
                info!(
                    "Synced conversation {}: {} new messages",
                    conversation_id, new_messages
                );
                let _ = self.events_tx.send(SyncEvent::Completed {
                    conversation_id: conversation_id.to_string(),
                    new_messages: *new_messages,
                });
            }
            Ok(SyncOutcome::Empty) => {
                debug!("Conversation {} is empty", conversation_id);
                let _ = self.events_tx.send(SyncEvent::Completed {
                    conversation_id: conversation_id.to_string(),
                    new_messages: 0,
                });
            }
            Ok(SyncOutcome::Cancelled) => {
                debug!("Sync of conversation {} cancelled", conversation_id);
                let _ = self.events_tx.send(SyncEvent::Cancelled {
                    conversation_id: conversation_id.to_string(),
                });
            }
            Err(e) => {
                warn!("Sync of conversation {} failed: {}", conversation_id, e);
                let _ = self.events_tx.send(SyncEvent::Failed {
                    conversation_id: conversation_id.to_string(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_sync(
        &self,
        conversation_id: &str,
        token: &CancelToken,
    ) -> Result<SyncOutcome, CacheError> {
        let status = self.store.index_status(conversation_id)?;
        let cursor = status.last_indexed_id;

        let latest = self.source.fetch_latest(conversation_id).await?;
        if latest.is_empty() {
            return Ok(SyncOutcome::Empty);
        }

        let (newest_head, page_oldest) = page_bounds(&latest)?;
        let mut new_messages = count_above(&latest, cursor);
        let mut boundary = page_oldest;

        // An interrupted backfill left bookmarks behind; if its committed
        // range overlaps the latest page, skip straight past what it already
        // stored. A gap between the old head and this page means messages
        // arrived in between, so the bookmarks are unusable.
        if let (Some(resume_head), Some(resume_boundary)) =
            (status.resume_head, status.resume_boundary)
        {
            if resume_head >= page_oldest && resume_boundary > cursor && resume_boundary < boundary
            {
                debug!(
                    "Resuming backfill of conversation {} below {}",
                    conversation_id, resume_boundary
                );
                boundary = resume_boundary;
            }
        }

        let committed = self
            .store
            .commit_page(conversation_id, &latest, newest_head, boundary)?;
        let _ = self.events_tx.send(SyncEvent::PageCommitted {
            conversation_id: conversation_id.to_string(),
            committed,
        });

        // Walk backward until the page reaches data already covered by the
        // cursor, or the remote runs out of history.
        while boundary > cursor.saturating_add(1) {
            if token.is_cancelled() {
                return Ok(SyncOutcome::Cancelled);
            }

            let page = self
                .source
                .fetch_before(conversation_id, &boundary.to_string())
                .await?;
            if page.is_empty() {
                break;
            }

            let (_, page_oldest) = page_bounds(&page)?;
            boundary = page_oldest;
            new_messages += count_above(&page, cursor);

            let committed = self
                .store
                .commit_page(conversation_id, &page, newest_head, boundary)?;
            let _ = self.events_tx.send(SyncEvent::PageCommitted {
                conversation_id: conversation_id.to_string(),
                committed,
            });
        }

        self.store.finish_sync(conversation_id, newest_head)?;
        Ok(SyncOutcome::Complete { new_messages })
    }

    /// Sync many conversations with bounded concurrency, returning each
    /// conversation's outcome. Failures are per-conversation; one failing
    /// conversation does not stop the others.
    pub async fn sync_all(
        &self,
        conversation_ids: &[String],
        max_concurrent: usize,
    ) -> Vec<(String, Result<SyncOutcome, CacheError>)> {
        futures::stream::iter(conversation_ids.iter().cloned())
            .map(|id| async move {
                let result = self.sync_conversation(&id).await;
                (id, result)
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }
}

fn page_bounds(page: &[Message]) -> Result<(u64, u64), CacheError> {
    let mut newest = 0u64;
    let mut oldest = u64::MAX;
    for msg in page {
        let id = parse_message_id(&msg.id)?;
        newest = newest.max(id);
        oldest = oldest.min(id);
    }
    Ok((newest, oldest))
}

fn count_above(page: &[Message], cursor: u64) -> usize {
    page.iter()
        .filter(|m| parse_message_id(&m.id).map(|id| id > cursor).unwrap_or(false))
        .count()
}
