//! Stream merger
//!
//! Folds an ordered sequence of fragments into one bot entry. The whole
//! accumulated text is written on every fragment, never the fragment alone.

use crate::conversation::{ConversationHandle, StoreError, StreamTicket};
use crate::llm::{FragmentStream, LlmError};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Text shown in place of a reply that could not be produced
pub const FAILURE_MESSAGE: &str =
    "Sorry, I couldn't get a response. Please check your API key or try again later.";

/// Longest wait for the next fragment before the reply is failed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How a merge ended
#[derive(Debug)]
pub enum MergeOutcome {
    /// Stream closed normally after `fragments` fragments
    Completed { fragments: usize },
    /// Request or stream failed; the entry shows `FAILURE_MESSAGE`
    Failed(LlmError),
    /// The conversation moved on (cleared or cancelled); remaining fragments were dropped
    Superseded,
    /// The store refused a write that should have been valid
    StoreFault(StoreError),
}

impl MergeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, MergeOutcome::Completed { .. })
    }
}

/// Owns the obligation to settle one bot entry.
///
/// Dropping an unsettled guard fails the entry, so a turn that is never
/// run, or whose task is aborted, cannot leave an entry streaming.
#[derive(Debug)]
pub struct StreamGuard {
    conversation: ConversationHandle,
    ticket: StreamTicket,
    settled: bool,
}

impl StreamGuard {
    pub fn new(conversation: ConversationHandle, ticket: StreamTicket) -> Self {
        Self {
            conversation,
            ticket,
            settled: false,
        }
    }

    pub fn ticket(&self) -> StreamTicket {
        self.ticket
    }

    fn settle(mut self, outcome: &MergeOutcome) {
        self.settled = true;
        let ticket = self.ticket;
        let result = self.conversation.with(|store| match outcome {
            MergeOutcome::Completed { .. } | MergeOutcome::Superseded => store.finalize_for(ticket),
            MergeOutcome::Failed(_) | MergeOutcome::StoreFault(_) => {
                store.fail_for(ticket, FAILURE_MESSAGE)
            }
        });
        log_settle_error(ticket, result);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let ticket = self.ticket;
        tracing::warn!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            "Reply abandoned before completion"
        );
        let result = self
            .conversation
            .with(|store| store.fail_for(ticket, FAILURE_MESSAGE));
        log_settle_error(ticket, result);
    }
}

fn log_settle_error(ticket: StreamTicket, result: Result<(), StoreError>) {
    match result {
        // Entry already gone with its generation
        Ok(()) | Err(StoreError::Stale { .. }) => {}
        Err(e) => tracing::error!(
            entry_id = %ticket.bot_id,
            error = %e,
            "Failed to settle reply entry"
        ),
    }
}

/// Open the stream with `open` and merge its fragments into the guarded entry.
///
/// A stream that yields nothing for `idle_timeout` fails the reply. The
/// entry is settled before this returns, whatever the outcome.
pub async fn merge_stream<F>(
    guard: StreamGuard,
    open: F,
    cancel: CancellationToken,
    idle_timeout: Duration,
) -> MergeOutcome
where
    F: Future<Output = Result<FragmentStream, LlmError>>,
{
    let ticket = guard.ticket();
    let start = std::time::Instant::now();
    let outcome = drive(&guard.conversation, ticket, open, &cancel, idle_timeout).await;

    match &outcome {
        MergeOutcome::Completed { fragments } => tracing::info!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            fragments = *fragments,
            duration_ms = %start.elapsed().as_millis(),
            "Reply finalized"
        ),
        MergeOutcome::Failed(e) => tracing::warn!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            kind = e.kind.as_str(),
            error = %e.message,
            "Reply failed"
        ),
        MergeOutcome::Superseded => tracing::info!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            "Reply superseded, discarding remaining fragments"
        ),
        MergeOutcome::StoreFault(e) => tracing::error!(
            entry_id = %ticket.bot_id,
            generation = %ticket.generation,
            error = %e,
            "Store rejected reply update"
        ),
    }

    guard.settle(&outcome);
    outcome
}

async fn drive<F>(
    conversation: &ConversationHandle,
    ticket: StreamTicket,
    open: F,
    cancel: &CancellationToken,
    idle_timeout: Duration,
) -> MergeOutcome
where
    F: Future<Output = Result<FragmentStream, LlmError>>,
{
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return MergeOutcome::Superseded,
        result = open => result,
    };
    let mut fragments = match opened {
        Ok(stream) => stream,
        Err(e) => return MergeOutcome::Failed(e),
    };

    if let Err(e) = conversation.with(|store| store.begin_stream_for(ticket)) {
        return store_outcome(e);
    }

    let mut text = String::new();
    let mut count = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return MergeOutcome::Superseded,
            next = tokio::time::timeout(idle_timeout, fragments.next()) => match next {
                Ok(next) => next,
                Err(_) => {
                    return MergeOutcome::Failed(LlmError::network(format!(
                        "No fragment received for {}s",
                        idle_timeout.as_secs()
                    )))
                }
            },
        };

        match next {
            Some(Ok(fragment)) => {
                text.push_str(&fragment);
                count += 1;
                if let Err(e) = conversation.with(|store| store.update_text_for(ticket, text.as_str())) {
                    return store_outcome(e);
                }
            }
            Some(Err(e)) => return MergeOutcome::Failed(e),
            None => return MergeOutcome::Completed { fragments: count },
        }
    }
}

fn store_outcome(error: StoreError) -> MergeOutcome {
    match error {
        StoreError::Stale { .. } => MergeOutcome::Superseded,
        other => MergeOutcome::StoreFault(other),
    }
}
