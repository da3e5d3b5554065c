//! Render selector
//!
//! Maps an entry to the views a client draws for it. Pure: the same entry
//! and options always produce the same views, so callers re-run it on every
//! store notification.

use crate::conversation::{Entry, EntryId, Role};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::Serialize;
use std::collections::HashSet;

pub const TRACE_LABEL_LIVE: &str = "Thinking...";
pub const TRACE_LABEL_DONE: &str = "Thought process";

/// One visual block of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    PlainText {
        text: String,
    },
    /// Raw model output shown above the final answer
    ThinkingTrace {
        text: String,
        live: bool,
        expanded: bool,
        label: &'static str,
    },
    /// Placeholder while the answer is still streaming
    Shimmer,
    Markdown {
        html: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// When false, answers use the escaped-paragraph fallback
    pub markdown: bool,
    /// Entries whose thinking trace the user collapsed
    pub collapsed: &'a HashSet<EntryId>,
}

/// An entry together with its views
#[derive(Debug, Clone, Serialize)]
pub struct RenderedEntry {
    #[serde(flatten)]
    pub entry: Entry,
    pub streaming: bool,
    pub views: Vec<View>,
}

pub fn render_entry(entry: &Entry, options: RenderOptions<'_>) -> Vec<View> {
    match entry.role {
        Role::User => vec![View::PlainText {
            text: entry.text.clone(),
        }],
        Role::Bot => {
            let streaming = entry.is_streaming();
            let mut views = Vec::with_capacity(2);

            if entry.model_variant.is_some_and(|v| v.shows_thinking_trace()) {
                views.push(View::ThinkingTrace {
                    text: entry.text.clone(),
                    live: streaming,
                    expanded: !options.collapsed.contains(&entry.id),
                    label: if streaming {
                        TRACE_LABEL_LIVE
                    } else {
                        TRACE_LABEL_DONE
                    },
                });
            }

            if streaming {
                views.push(View::Shimmer);
            } else if !entry.text.is_empty() {
                let html = if options.markdown {
                    markdown_to_html(&entry.text)
                } else {
                    escaped_paragraph(&entry.text)
                };
                views.push(View::Markdown { html });
            }
            views
        }
    }
}

pub fn render_conversation(entries: &[Entry], options: RenderOptions<'_>) -> Vec<RenderedEntry> {
    entries
        .iter()
        .map(|entry| RenderedEntry {
            entry: entry.clone(),
            streaming: entry.is_streaming(),
            views: render_entry(entry, options),
        })
        .collect()
}

/// CommonMark to HTML. Raw HTML in the source is emitted as text.
pub fn markdown_to_html(text: &str) -> String {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, md_options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn escaped_paragraph(text: &str) -> String {
    format!("<p>{}</p>", text.replace('<', "&lt;").replace('>', "&gt;"))
}
