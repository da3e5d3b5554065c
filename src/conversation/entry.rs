//! Conversation entry types

use crate::llm::ModelVariant;
use crate::state_machine::EntryState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable key of an entry; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: EntryId,
    pub role: Role,
    pub text: String,
    pub state: EntryState,
    /// Variant that produced a bot entry; affects rendering only
    pub model_variant: Option<ModelVariant>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// A fully populated user entry
    pub fn user(id: EntryId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            text: text.into(),
            state: EntryState::Finalized,
            model_variant: None,
            created_at: Utc::now(),
        }
    }

    /// An empty bot entry waiting for its stream
    pub fn bot_placeholder(id: EntryId, variant: Option<ModelVariant>) -> Self {
        Self {
            id,
            role: Role::Bot,
            text: String::new(),
            state: EntryState::Pending,
            model_variant: variant,
            created_at: Utc::now(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }
}
