//! Common types for LLM interactions

use super::LlmError;
use futures::stream::BoxStream;

/// Lazy, ordered sequence of text fragments for one reply.
///
/// Ends with `None` on a clean close; an `Err` item is terminal.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

/// Speaker of a turn kept in session history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

/// One completed exchange half, as remembered by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}
