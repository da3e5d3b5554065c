//! Supernova - streaming chat over the Gemini API
//!
//! Serves one conversation over HTTP: submissions go to the selected model,
//! replies stream back into the conversation and out to SSE subscribers.

mod api;
mod chat;
mod config;
mod conversation;
mod llm;
mod render;
mod state_machine;

use api::{create_router, AppState};
use chat::{Chat, ChatSettings};
use config::AppConfig;
use llm::GeminiBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supernova=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env();

    let backend = GeminiBackend::new(config.api_key.clone(), Some(config.base_url.as_str()))?;
    if !backend.has_credential() {
        tracing::warn!("No API key configured. Set GEMINI_API_KEY or API_KEY; replies will fail.");
    }
    let chat = Chat::new(
        Arc::new(backend),
        ChatSettings {
            initial_variant: config.initial_variant,
            pro_budget: config.pro_budget,
            idle_timeout: config.idle_timeout,
        },
    );
    tracing::info!(
        model = %config.initial_variant.api_name(),
        markdown = config.markdown,
        "Chat initialized"
    );

    // Create application state
    let state = AppState::new(Arc::new(chat), config.markdown);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Supernova server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
