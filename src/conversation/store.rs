//! Append-only message store
//!
//! Entries are only ever appended, mutated in place while streaming, or
//! dropped all at once by `clear()`. Every mutation is broadcast to
//! subscribers before the mutating call returns.

use super::entry::{Entry, EntryId};
use crate::llm::ModelVariant;
use crate::state_machine::{transition, EntryEvent, TransitionError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Counter bumped by every `clear()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof that a writer targets a bot entry of a specific generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTicket {
    pub user_id: EntryId,
    pub bot_id: EntryId,
    pub generation: Generation,
}

/// Change notification emitted on every mutation
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Appended { generation: Generation, entry: Entry },
    TextUpdated { generation: Generation, entry: Entry },
    StateChanged { generation: Generation, entry: Entry },
    Cleared { generation: Generation },
}

impl StoreEvent {
    pub fn generation(&self) -> Generation {
        match self {
            StoreEvent::Appended { generation, .. }
            | StoreEvent::TextUpdated { generation, .. }
            | StoreEvent::StateChanged { generation, .. }
            | StoreEvent::Cleared { generation } => *generation,
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            StoreEvent::Appended { entry, .. }
            | StoreEvent::TextUpdated { entry, .. }
            | StoreEvent::StateChanged { entry, .. } => Some(entry),
            StoreEvent::Cleared { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::Appended { .. } => "entry_appended",
            StoreEvent::TextUpdated { .. } => "entry_text",
            StoreEvent::StateChanged { .. } => "entry_state",
            StoreEvent::Cleared { .. } => "cleared",
        }
    }
}

/// Store misuse. These are programming errors, never shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Entry {0} already exists")]
    DuplicateId(EntryId),
    #[error("Entry {0} not found")]
    NotFound(EntryId),
    #[error("Entry {id} belongs to generation {ticket}, conversation is at {current}")]
    Stale {
        id: EntryId,
        ticket: Generation,
        current: Generation,
    },
    #[error("Entry {busy} is still streaming")]
    AlreadyStreaming { busy: EntryId },
    #[error("Entry {id}: {source}")]
    Transition {
        id: EntryId,
        source: TransitionError,
    },
}

/// Ordered log of conversation entries
#[derive(Debug)]
pub struct MessageStore {
    entries: Vec<Entry>,
    generation: Generation,
    next_id: u64,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Vec::new(),
            generation: Generation::default(),
            next_id: 1,
            events,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The single entry still receiving text, if any
    pub fn streaming_entry(&self) -> Option<&Entry> {
        self.entries.iter().find(|e| e.is_streaming())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Add an entry to the end of the conversation
    pub fn append(&mut self, entry: Entry) -> Result<(), StoreError> {
        if self.get(entry.id).is_some() {
            return Err(StoreError::DuplicateId(entry.id));
        }
        if entry.is_streaming() {
            if let Some(busy) = self.streaming_entry() {
                return Err(StoreError::AlreadyStreaming { busy: busy.id });
            }
        }

        self.next_id = self.next_id.max(entry.id.0.saturating_add(1));
        self.entries.push(entry.clone());
        self.emit(StoreEvent::Appended {
            generation: self.generation,
            entry,
        });
        Ok(())
    }

    /// Append a user entry and its placeholder reply in one step
    pub fn append_turn(
        &mut self,
        text: impl Into<String>,
        variant: Option<ModelVariant>,
    ) -> Result<StreamTicket, StoreError> {
        if let Some(busy) = self.streaming_entry() {
            return Err(StoreError::AlreadyStreaming { busy: busy.id });
        }

        let user_id = self.allocate_id();
        let bot_id = self.allocate_id();
        // Ids saturate, so both must be free before either is appended
        if user_id == bot_id || self.get(user_id).is_some() {
            return Err(StoreError::DuplicateId(user_id));
        }
        if self.get(bot_id).is_some() {
            return Err(StoreError::DuplicateId(bot_id));
        }
        self.append(Entry::user(user_id, text))?;
        self.append(Entry::bot_placeholder(bot_id, variant))?;

        Ok(StreamTicket {
            user_id,
            bot_id,
            generation: self.generation,
        })
    }

    /// Mark the request for `id` as open
    pub fn begin_stream(&mut self, id: EntryId) -> Result<(), StoreError> {
        self.apply(id, EntryEvent::StreamOpened, None)
    }

    /// Replace the text of a streaming entry
    pub fn update_text(&mut self, id: EntryId, text: impl Into<String>) -> Result<(), StoreError> {
        self.apply(id, EntryEvent::Fragment, Some(text.into()))
    }

    /// Mark an entry as complete. Idempotent.
    pub fn finalize(&mut self, id: EntryId) -> Result<(), StoreError> {
        self.apply(id, EntryEvent::StreamClosed, None)
    }

    /// Replace the text with `message` and mark the entry failed. Idempotent.
    pub fn fail(&mut self, id: EntryId, message: impl Into<String>) -> Result<(), StoreError> {
        self.apply(id, EntryEvent::StreamFailed, Some(message.into()))
    }

    /// Drop every entry and start a new generation
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation = Generation(self.generation.0 + 1);
        tracing::debug!(generation = %self.generation, "Conversation cleared");
        self.emit(StoreEvent::Cleared {
            generation: self.generation,
        });
    }

    /// Fail with `Stale` unless `ticket` belongs to the current generation
    pub fn check(&self, ticket: StreamTicket) -> Result<(), StoreError> {
        if ticket.generation == self.generation {
            Ok(())
        } else {
            Err(StoreError::Stale {
                id: ticket.bot_id,
                ticket: ticket.generation,
                current: self.generation,
            })
        }
    }

    pub fn begin_stream_for(&mut self, ticket: StreamTicket) -> Result<(), StoreError> {
        self.check(ticket)?;
        self.begin_stream(ticket.bot_id)
    }

    pub fn update_text_for(
        &mut self,
        ticket: StreamTicket,
        text: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.check(ticket)?;
        self.update_text(ticket.bot_id, text)
    }

    pub fn finalize_for(&mut self, ticket: StreamTicket) -> Result<(), StoreError> {
        self.check(ticket)?;
        self.finalize(ticket.bot_id)
    }

    pub fn fail_for(
        &mut self,
        ticket: StreamTicket,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.check(ticket)?;
        self.fail(ticket.bot_id, message)
    }

    fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    fn apply(
        &mut self,
        id: EntryId,
        event: EntryEvent,
        text: Option<String>,
    ) -> Result<(), StoreError> {
        let generation = self.generation;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let before = entry.state;
        let after = transition(before, event).map_err(|source| StoreError::Transition { id, source })?;
        if before.is_terminal() {
            // Completion of a settled entry: nothing changes
            return Ok(());
        }

        entry.state = after;
        if let Some(text) = text {
            entry.text = text;
        }
        let entry = entry.clone();

        let notification = match event {
            EntryEvent::Fragment => StoreEvent::TextUpdated { generation, entry },
            EntryEvent::StreamOpened | EntryEvent::StreamClosed | EntryEvent::StreamFailed => {
                StoreEvent::StateChanged { generation, entry }
            }
        };
        self.emit(notification);
        Ok(())
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
