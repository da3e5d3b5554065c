//! Chat controller
//!
//! Owns the active model variant and its session, turns user submissions
//! into conversation turns, and drives each reply through the merger.

mod merger;

#[cfg(test)]
pub mod testing;

pub use merger::{merge_stream, MergeOutcome, StreamGuard, DEFAULT_IDLE_TIMEOUT, FAILURE_MESSAGE};

use crate::conversation::{ConversationHandle, StoreError, StreamTicket};
use crate::llm::{
    ChatBackend, ChatSession, LlmError, LoggingSession, ModelVariant, SessionConfig,
    DEFAULT_PRO_RESPONSE_BUDGET,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Startup options for the controller
#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    pub initial_variant: ModelVariant,
    /// Thinking budget for the higher tier
    pub pro_budget: u32,
    /// A reply that goes this long without a fragment fails
    pub idle_timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            initial_variant: ModelVariant::default(),
            pro_budget: DEFAULT_PRO_RESPONSE_BUDGET,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Why a submission did not start a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Text was empty after trimming
    Empty,
    /// A reply is still streaming
    Busy,
    /// The store refused the turn for another reason
    Internal,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(Turn),
    Rejected(RejectReason),
}

/// An accepted submission whose reply has not been merged yet.
///
/// The user entry and bot placeholder are already in the store. Dropping
/// a turn without running it fails the placeholder.
pub struct Turn {
    guard: StreamGuard,
    text: String,
    session: Option<Arc<dyn ChatSession>>,
    cancel: CancellationToken,
    idle_timeout: Duration,
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("ticket", &self.guard.ticket())
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Turn {
    pub fn ticket(&self) -> StreamTicket {
        self.guard.ticket()
    }

    /// Send the text and merge the reply into the bot entry
    pub async fn run(self) -> MergeOutcome {
        let Turn {
            guard,
            text,
            session,
            cancel,
            idle_timeout,
        } = self;

        let open = async move {
            match session {
                Some(session) => session.send_streaming(&text).await,
                None => Err(LlmError::configuration(
                    "Chat session not initialized: no API key",
                )),
            }
        };
        merge_stream(guard, open, cancel, idle_timeout).await
    }
}

struct ActiveSession {
    variant: ModelVariant,
    session: Option<Arc<dyn ChatSession>>,
    /// Cancelled when the variant changes; each turn gets a child token
    cancel: CancellationToken,
}

pub struct Chat {
    conversation: ConversationHandle,
    backend: Arc<dyn ChatBackend>,
    pro_budget: u32,
    idle_timeout: Duration,
    active: Mutex<ActiveSession>,
}

impl Chat {
    pub fn new(backend: Arc<dyn ChatBackend>, settings: ChatSettings) -> Self {
        let variant = settings.initial_variant;
        let session = open_session(backend.as_ref(), variant, settings.pro_budget);
        Self {
            conversation: ConversationHandle::new(),
            backend,
            pro_budget: settings.pro_budget,
            idle_timeout: settings.idle_timeout,
            active: Mutex::new(ActiveSession {
                variant,
                session,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn conversation(&self) -> &ConversationHandle {
        &self.conversation
    }

    pub fn variant(&self) -> ModelVariant {
        self.lock_active().variant
    }

    pub fn has_session(&self) -> bool {
        self.lock_active().session.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.conversation.is_streaming()
    }

    /// Start a turn for `text`.
    ///
    /// Whitespace-only text and submissions made while a reply is still
    /// streaming are rejected without touching the store.
    pub fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("Ignoring empty submission");
            return SubmitOutcome::Rejected(RejectReason::Empty);
        }

        let active = self.lock_active();
        let variant = active.variant;
        let ticket = match self
            .conversation
            .with(|store| store.append_turn(text, Some(variant)))
        {
            Ok(ticket) => ticket,
            Err(StoreError::AlreadyStreaming { busy }) => {
                tracing::debug!(busy = %busy, "Submission rejected, reply still streaming");
                return SubmitOutcome::Rejected(RejectReason::Busy);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to append turn");
                return SubmitOutcome::Rejected(RejectReason::Internal);
            }
        };

        tracing::info!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            model = %variant.api_name(),
            prompt_chars = text.chars().count(),
            "Turn accepted"
        );

        SubmitOutcome::Accepted(Turn {
            guard: StreamGuard::new(self.conversation.clone(), ticket),
            text: text.to_string(),
            session: active.session.clone(),
            cancel: active.cancel.child_token(),
            idle_timeout: self.idle_timeout,
        })
    }

    /// Submit and run to completion. `None` if the submission was rejected.
    pub async fn send(&self, text: &str) -> Option<MergeOutcome> {
        match self.submit(text) {
            SubmitOutcome::Accepted(turn) => Some(turn.run().await),
            SubmitOutcome::Rejected(_) => None,
        }
    }

    /// Switch to `variant`, discarding the conversation and any in-flight reply.
    ///
    /// Returns false if `variant` is already active.
    pub fn change_variant(&self, variant: ModelVariant) -> bool {
        let mut active = self.lock_active();
        if active.variant == variant {
            return false;
        }

        let previous = active.variant;
        active.cancel.cancel();
        self.conversation.with(|store| store.clear());

        // Old session goes before the new one is created
        drop(active.session.take());
        active.session = open_session(self.backend.as_ref(), variant, self.pro_budget);
        active.variant = variant;
        active.cancel = CancellationToken::new();

        tracing::info!(
            from = %previous,
            to = %variant,
            model = %variant.api_name(),
            has_session = active.session.is_some(),
            "Model variant changed"
        );
        true
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveSession> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_session(
    backend: &dyn ChatBackend,
    variant: ModelVariant,
    pro_budget: u32,
) -> Option<Arc<dyn ChatSession>> {
    let config = SessionConfig::for_variant(variant, pro_budget);
    match backend.create_session(variant, config) {
        Ok(session) => {
            tracing::info!(
                model = %variant.api_name(),
                response_budget = ?config.response_budget,
                "Chat session created"
            );
            Some(Arc::new(LoggingSession::new(session)))
        }
        Err(e) if e.kind.is_configuration() => {
            tracing::warn!(
                model = %variant.api_name(),
                error = %e.message,
                "Chat session unavailable, replies will fail until configured"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                model = %variant.api_name(),
                kind = e.kind.as_str(),
                error = %e.message,
                "Failed to create chat session"
            );
            None
        }
    }
}
