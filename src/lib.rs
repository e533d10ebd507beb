//! Local persistent cache for a backward-paginated chat service.
//!
//! The remote service only pages backward from the newest message, so reading
//! history straight from it is slow and repetitive. This crate maintains a
//! SQLite cache that a [`SyncEngine`] fills by walking pages backward until it
//! reaches already-cached data, committing each page durably so interrupted
//! runs resume instead of starting over. On top of the cache sit a filtered,
//! paged [`MessageView`] and a [`ConversationTracker`] for unread counts.
//!
//! Module organization:
//!
//! - `error`: the crate-wide error type
//! - `model`: messages and attachments as the remote shapes them
//! - `remote`: the trait a remote transport implements
//! - `store`: SQLite persistence (messages, cursors, read-state)
//! - `sync`: the backward-paginating sync engine
//! - `query`: filters and paged views over the cache
//! - `tracker`: unread counting against remote live totals

pub mod error;
pub mod model;
pub mod query;
pub mod remote;
pub mod store;
pub mod sync;
pub mod tracker;

pub use error::CacheError;
pub use model::{Attachment, AttachmentKind, Message};
pub use query::{MessageFilter, MessageView, SortOrder, PAGE_SIZE};
pub use remote::MessageSource;
pub use store::{IndexStatus, MessageStore};
pub use sync::{CancelToken, SyncEngine, SyncEvent, SyncOutcome};
pub use tracker::ConversationTracker;
