//! External chat collaborator
//!
//! Session creation and streaming send against the hosted model API.
//! Everything above this module only sees fragments and `LlmError`.

mod error;
mod gemini;
mod models;
mod sse;
mod types;

#[cfg(test)]
mod proptests;

pub use error::{LlmError, LlmErrorKind};
pub use gemini::{GeminiBackend, DEFAULT_GEMINI_BASE_URL};
pub use models::{ModelVariant, SessionConfig, UnknownVariant, DEFAULT_PRO_RESPONSE_BUDGET};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Creates chat sessions for a model variant
pub trait ChatBackend: Send + Sync {
    /// Create a fresh session with empty history
    fn create_session(
        &self,
        variant: ModelVariant,
        config: SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, LlmError>;
}

/// A stateful multi-turn chat with one model
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Variant this session was created for
    fn variant(&self) -> ModelVariant;

    /// Send `text` and stream the reply back as fragments
    async fn send_streaming(&self, text: &str) -> Result<FragmentStream, LlmError>;
}

/// Logging wrapper for chat sessions
pub struct LoggingSession {
    inner: Arc<dyn ChatSession>,
}

impl LoggingSession {
    pub fn new(inner: Arc<dyn ChatSession>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChatSession for LoggingSession {
    fn variant(&self) -> ModelVariant {
        self.inner.variant()
    }

    async fn send_streaming(&self, text: &str) -> Result<FragmentStream, LlmError> {
        let start = std::time::Instant::now();
        let variant = self.inner.variant();
        let result = self.inner.send_streaming(text).await;
        let duration = start.elapsed();

        match result {
            Ok(stream) => {
                tracing::info!(
                    model = %variant.api_name(),
                    duration_ms = %duration.as_millis(),
                    prompt_chars = text.chars().count(),
                    "LLM stream opened"
                );
                Ok(stream
                    .inspect(move |item| {
                        if let Err(e) = item {
                            tracing::warn!(
                                model = %variant.api_name(),
                                error = %e.message,
                                kind = e.kind.as_str(),
                                "LLM stream failed"
                            );
                        }
                    })
                    .boxed())
            }
            Err(e) => {
                tracing::error!(
                    model = %variant.api_name(),
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM request failed"
                );
                Err(e)
            }
        }
    }
}
