//! Pulls remote conversation history into the local store.
//!
//! The store is a cache of remote state, not the source of truth: sync only
//! ever adds or overwrites messages, and the remote is always right about
//! content. The remote offers no forward pagination, so catching up means
//! walking backward from the newest page until reaching data we already hold.

mod engine;

pub use engine::{CancelToken, SyncEngine, SyncEvent, SyncOutcome};
