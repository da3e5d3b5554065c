//! Conversation state
//!
//! The message store and a cloneable handle to it. The handle never holds
//! its lock across an `.await`; every access is a short synchronous closure.

mod entry;
mod store;

#[cfg(test)]
mod proptests;

pub use entry::{Entry, EntryId, Role};
pub use store::{Generation, MessageStore, StoreError, StoreEvent, StreamTicket};

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Shared access to the one active conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationHandle {
    store: Arc<Mutex<MessageStore>>,
}

impl ConversationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the store
    pub fn with<R>(&self, f: impl FnOnce(&mut MessageStore) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<Entry> {
        self.with(|store| store.entries().to_vec())
    }

    pub fn is_streaming(&self) -> bool {
        self.with(|store| store.streaming_entry().is_some())
    }

    /// Snapshot, its generation and a subscription, taken atomically so no
    /// change falls between them
    pub fn snapshot_and_subscribe(
        &self,
    ) -> (Vec<Entry>, Generation, broadcast::Receiver<StoreEvent>) {
        self.with(|store| (store.entries().to_vec(), store.generation(), store.subscribe()))
    }
}
