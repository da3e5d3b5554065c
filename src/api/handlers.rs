//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, ConversationResponse, ErrorResponse, ModelChangeResponse,
    ModelInfo, ModelRequest, ModelsResponse, TraceToggleResponse,
};
use super::AppState;
use crate::chat::{RejectReason, SubmitOutcome};
use crate::conversation::EntryId;
use crate::llm::ModelVariant;
use crate::render::render_conversation;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/conversation", get(get_conversation))
        .route("/api/stream", get(stream_conversation))
        .route("/api/chat", post(send_chat))
        .route("/api/model", post(change_model))
        .route("/api/models", get(list_models))
        .route("/api/trace/:id/toggle", post(toggle_trace))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversation
// ============================================================

async fn get_conversation(State(state): State<AppState>) -> Json<ConversationResponse> {
    let (entries, generation) = state
        .chat
        .conversation()
        .with(|store| (store.entries().to_vec(), store.generation()));
    let streaming = entries.iter().any(|e| e.is_streaming());
    let rendered = state.with_render_options(generation, |options| {
        render_conversation(&entries, options)
    });
    let variant = state.chat.variant();

    Json(ConversationResponse {
        model: variant,
        model_label: variant.display_name(),
        generation,
        streaming,
        has_session: state.chat.has_session(),
        entries: rendered,
    })
}

async fn stream_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let (entries, generation, rx) = state.chat.conversation().snapshot_and_subscribe();
    sse_stream(state, entries, generation, rx)
}

// ============================================================
// User Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    match state.chat.submit(&req.text) {
        SubmitOutcome::Accepted(turn) => {
            let ticket = turn.ticket();
            tokio::spawn(turn.run());
            Ok((
                StatusCode::ACCEPTED,
                Json(ChatResponse {
                    user_id: ticket.user_id,
                    bot_id: ticket.bot_id,
                    generation: ticket.generation,
                }),
            ))
        }
        SubmitOutcome::Rejected(RejectReason::Empty) => {
            Err(AppError::BadRequest("Message text is empty".to_string()))
        }
        SubmitOutcome::Rejected(RejectReason::Busy) => {
            Err(AppError::Conflict("A reply is still streaming".to_string()))
        }
        SubmitOutcome::Rejected(RejectReason::Internal) => {
            Err(AppError::Internal("Could not start a turn".to_string()))
        }
    }
}

async fn change_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ModelChangeResponse>, AppError> {
    let variant: ModelVariant = req
        .model
        .parse()
        .map_err(|e: crate::llm::UnknownVariant| AppError::BadRequest(e.to_string()))?;
    let changed = state.chat.change_variant(variant);
    Ok(Json(ModelChangeResponse {
        model: variant,
        changed,
    }))
}

async fn toggle_trace(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TraceToggleResponse>, AppError> {
    let id = EntryId(id);
    let expanded = state
        .toggle_trace(id)
        .ok_or_else(|| AppError::NotFound(format!("No thinking trace for entry {id}")))?;
    Ok(Json(TraceToggleResponse { id, expanded }))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: ModelVariant::all().iter().copied().map(ModelInfo::from).collect(),
        current: state.chat.variant(),
    })
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("supernova ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
