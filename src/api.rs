//! HTTP API
//!
//! Submit box, model picker and live conversation feed for a browser or
//! terminal client.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::chat::Chat;
use crate::conversation::{EntryId, Generation, Role};
use crate::render::RenderOptions;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Thinking traces the user collapsed, scoped to one conversation generation
#[derive(Debug, Default)]
struct TraceToggles {
    generation: Generation,
    collapsed: HashSet<EntryId>,
}

impl TraceToggles {
    /// Forget toggles that belong to a cleared conversation
    fn advance(&mut self, generation: Generation) {
        if generation > self.generation {
            self.generation = generation;
            self.collapsed.clear();
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<Chat>,
    pub markdown: bool,
    toggles: Arc<Mutex<TraceToggles>>,
}

impl AppState {
    pub fn new(chat: Arc<Chat>, markdown: bool) -> Self {
        Self {
            chat,
            markdown,
            toggles: Arc::new(Mutex::new(TraceToggles::default())),
        }
    }

    /// Run `f` with render options valid for `generation`
    pub fn with_render_options<R>(
        &self,
        generation: Generation,
        f: impl FnOnce(RenderOptions<'_>) -> R,
    ) -> R {
        let mut toggles = self.toggles.lock().unwrap_or_else(PoisonError::into_inner);
        toggles.advance(generation);
        // Late events from a cleared conversation render with defaults
        let empty = HashSet::new();
        let collapsed = if generation < toggles.generation {
            &empty
        } else {
            &toggles.collapsed
        };
        f(RenderOptions {
            markdown: self.markdown,
            collapsed,
        })
    }

    /// Flip the trace of entry `id`. Returns the new expanded state, or
    /// `None` if the entry does not exist or shows no trace.
    pub fn toggle_trace(&self, id: EntryId) -> Option<bool> {
        let (entry, generation) = self
            .chat
            .conversation()
            .with(|store| (store.get(id).cloned(), store.generation()));
        let entry = entry?;
        let has_trace = entry.role == Role::Bot
            && entry.model_variant.is_some_and(|v| v.shows_thinking_trace());
        if !has_trace {
            return None;
        }

        let mut toggles = self.toggles.lock().unwrap_or_else(PoisonError::into_inner);
        toggles.advance(generation);
        let expanded = if toggles.collapsed.remove(&id) {
            true
        } else {
            toggles.collapsed.insert(id);
            false
        };
        Some(expanded)
    }
}
