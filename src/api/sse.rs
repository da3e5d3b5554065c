//! Server-Sent Events support
//!
//! One `init` event with the whole rendered conversation, then one event per
//! store change carrying the affected entry re-rendered.

use super::AppState;
use crate::conversation::{Entry, Generation, StoreEvent};
use crate::render::{render_conversation, render_entry, RenderedEntry};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert a store subscription to an SSE stream
pub fn sse_stream(
    state: AppState,
    entries: Vec<Entry>,
    generation: Generation,
    broadcast_rx: broadcast::Receiver<StoreEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = init_event(&state, &entries, generation);
    let init = futures::stream::once(async move { Ok(init) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(move |result| match result {
        Ok(event) => Some(Ok(store_event_to_axum(&state, event))),
        Err(e) => {
            // Every event carries the full entry, so skipping is safe
            tracing::debug!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn init_event(state: &AppState, entries: &[Entry], generation: Generation) -> Event {
    let rendered = state.with_render_options(generation, |options| {
        render_conversation(entries, options)
    });
    let variant = state.chat.variant();
    let data = json!({
        "type": "init",
        "model": variant,
        "model_label": variant.display_name(),
        "generation": generation,
        "entries": rendered,
    });
    Event::default().event("init").data(data.to_string())
}

fn store_event_to_axum(state: &AppState, event: StoreEvent) -> Event {
    let event_type = event.kind();
    let generation = event.generation();
    let data = match event {
        StoreEvent::Appended { entry, .. }
        | StoreEvent::TextUpdated { entry, .. }
        | StoreEvent::StateChanged { entry, .. } => {
            let rendered = state.with_render_options(generation, |options| RenderedEntry {
                streaming: entry.is_streaming(),
                views: render_entry(&entry, options),
                entry,
            });
            json!({
                "type": event_type,
                "generation": generation,
                "entry": rendered,
            })
        }
        StoreEvent::Cleared { .. } => json!({
            "type": event_type,
            "generation": generation,
            "model": state.chat.variant(),
        }),
    };

    Event::default().event(event_type).data(data.to_string())
}
