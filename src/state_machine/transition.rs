//! Pure state transition function

use super::{EntryEvent, EntryState};
use thiserror::Error;

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Entry is {state}, its text can no longer change")]
    Terminal { state: EntryState },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs, it always produces the same output. Closing or
/// failing an entry that already reached a terminal state keeps that state,
/// which makes completion idempotent.
pub fn transition(state: EntryState, event: EntryEvent) -> Result<EntryState, TransitionError> {
    match (state, event) {
        (EntryState::Pending, EntryEvent::StreamOpened) => Ok(EntryState::Streaming),

        (EntryState::Streaming, EntryEvent::StreamOpened) => Err(
            TransitionError::InvalidTransition("stream is already open".to_string()),
        ),

        // A fragment implies the stream is open
        (EntryState::Pending | EntryState::Streaming, EntryEvent::Fragment) => {
            Ok(EntryState::Streaming)
        }

        (EntryState::Pending | EntryState::Streaming, EntryEvent::StreamClosed) => {
            Ok(EntryState::Finalized)
        }

        (EntryState::Pending | EntryState::Streaming, EntryEvent::StreamFailed) => {
            Ok(EntryState::Failed)
        }

        (
            terminal @ (EntryState::Finalized | EntryState::Failed),
            EntryEvent::StreamClosed | EntryEvent::StreamFailed,
        ) => Ok(terminal),

        (
            terminal @ (EntryState::Finalized | EntryState::Failed),
            EntryEvent::StreamOpened | EntryEvent::Fragment,
        ) => Err(TransitionError::Terminal { state: terminal }),
    }
}
