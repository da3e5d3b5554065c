//! Entry state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Placeholder created, request not yet open
    Pending,
    /// Fragments are arriving
    Streaming,
    /// Stream closed normally; text is final
    Finalized,
    /// Stream failed; text is the failure message
    Failed,
}

impl EntryState {
    /// True until the entry reaches a terminal state
    pub fn is_streaming(self) -> bool {
        matches!(self, EntryState::Pending | EntryState::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_streaming()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Streaming => "streaming",
            EntryState::Finalized => "finalized",
            EntryState::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
