//! API request and response types

use crate::conversation::{EntryId, Generation};
use crate::llm::ModelVariant;
use crate::render::RenderedEntry;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for an accepted chat message
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user_id: EntryId,
    pub bot_id: EntryId,
    pub generation: Generation,
}

/// Request to switch the model variant
#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelChangeResponse {
    pub model: ModelVariant,
    /// False when the requested variant was already active
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct TraceToggleResponse {
    pub id: EntryId,
    pub expanded: bool,
}

/// Current conversation with rendered views
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub model: ModelVariant,
    pub model_label: &'static str,
    pub generation: Generation,
    pub streaming: bool,
    /// False when no credential is configured
    pub has_session: bool,
    pub entries: Vec<RenderedEntry>,
}

/// Model information for the picker
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: ModelVariant,
    pub api_name: &'static str,
    pub label: &'static str,
    pub display_name: &'static str,
    pub thinking_trace: bool,
}

impl From<ModelVariant> for ModelInfo {
    fn from(variant: ModelVariant) -> Self {
        Self {
            id: variant,
            api_name: variant.api_name(),
            label: variant.menu_label(),
            display_name: variant.display_name(),
            thinking_trace: variant.shows_thinking_trace(),
        }
    }
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub current: ModelVariant,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
