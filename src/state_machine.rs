//! Entry lifecycle state machine
//!
//! Pure state transitions for a single bot entry:
//! `pending → streaming → finalized | failed`.

pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use event::EntryEvent;
pub use state::EntryState;
pub use transition::{transition, TransitionError};
