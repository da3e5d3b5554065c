//! Google Gemini streaming chat implementation

use super::sse::SseDecoder;
use super::types::{FragmentStream, HistoryTurn, TurnRole};
use super::{ChatBackend, ChatSession, LlmError, ModelVariant, SessionConfig};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Factory for Gemini chat sessions sharing one HTTP client
pub struct GeminiBackend {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: Option<String>, base_url: Option<&str>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url
                .unwrap_or(DEFAULT_GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Create a concrete session; `create_session` erases the type.
    pub fn session(
        &self,
        variant: ModelVariant,
        config: SessionConfig,
    ) -> Result<GeminiSession, LlmError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| LlmError::configuration("Chat session not initialized: no API key"))?;

        Ok(GeminiSession {
            client: self.client.clone(),
            url: format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.base_url,
                variant.api_name()
            ),
            api_key,
            variant,
            config,
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl ChatBackend for GeminiBackend {
    fn create_session(
        &self,
        variant: ModelVariant,
        config: SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, LlmError> {
        Ok(Arc::new(self.session(variant, config)?))
    }
}

/// One multi-turn chat against a single Gemini model
pub struct GeminiSession {
    client: Client,
    url: String,
    api_key: String,
    variant: ModelVariant,
    config: SessionConfig,
    history: Arc<Mutex<Vec<HistoryTurn>>>,
}

impl GeminiSession {
    fn build_request(&self, text: &str) -> GeminiRequest {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let contents = history
            .iter()
            .map(GeminiContent::from_turn)
            .chain(std::iter::once(GeminiContent::from_turn(&HistoryTurn::user(
                text,
            ))))
            .collect();

        GeminiRequest {
            contents,
            generation_config: self.config.response_budget.map(|budget| {
                GeminiGenerationConfig {
                    thinking_config: GeminiThinkingConfig {
                        thinking_budget: budget,
                    },
                }
            }),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    async fn send_streaming(&self, text: &str) -> Result<FragmentStream, LlmError> {
        let request = self.build_request(text);

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| {
                        if e.is_timeout() {
                            LlmError::network(format!("Stream timed out: {e}"))
                        } else {
                            LlmError::network(format!("Stream interrupted: {e}"))
                        }
                    })
            })
            .boxed();

        Ok(fragment_stream(body, Arc::clone(&self.history), text.to_string()))
    }
}

/// Map a non-success HTTP status (and its body) to an error kind
fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let detail = serde_json::from_str::<GeminiErrorResponse>(body)
        .map(|resp| resp.error.message)
        .or_else(|_| {
            serde_json::from_str::<Vec<GeminiErrorResponse>>(body).map(|resps| {
                resps
                    .into_iter()
                    .next()
                    .map(|resp| resp.error.message)
                    .unwrap_or_default()
            })
        });

    // Proxies answer with HTML; keep the status, show a short body
    let message = detail.unwrap_or_else(|_| body.chars().take(200).collect());

    match status.as_u16() {
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Closed,
    Failed,
}

/// Decoding state carried between polls of the fragment stream
struct ReplyState {
    body: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    reply: String,
    phase: Phase,
    history: Arc<Mutex<Vec<HistoryTurn>>>,
    prompt: String,
    usage: Option<GeminiUsageMetadata>,
    finish_reason: Option<String>,
}

impl ReplyState {
    fn absorb(&mut self, payload: &str) -> Result<(), LlmError> {
        let chunk: GeminiStreamChunk = serde_json::from_str(payload).map_err(|e| {
            LlmError::malformed(format!("Failed to parse stream chunk: {e} - data: {payload}"))
        })?;

        if let Some(error) = chunk.error {
            return Err(LlmError::server_error(format!(
                "Stream error: {}",
                error.message
            )));
        }
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::invalid_request(format!("Prompt blocked: {reason}")));
        }
        if chunk.usage_metadata.is_some() {
            self.usage = chunk.usage_metadata;
        }

        if let Some(candidate) = chunk.candidates.into_iter().next() {
            if candidate.finish_reason.is_some() {
                self.finish_reason = candidate.finish_reason;
            }
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            self.pending.extend(
                parts
                    .into_iter()
                    .filter(|part| part.thought != Some(true))
                    .filter_map(|part| part.text)
                    .filter(|text| !text.is_empty()),
            );
        }
        Ok(())
    }

    fn absorb_all(&mut self, payloads: Vec<String>) -> Result<(), LlmError> {
        payloads.iter().try_for_each(|payload| self.absorb(payload))
    }

    fn fail(&mut self) {
        self.phase = Phase::Failed;
        self.pending.clear();
    }

    /// Record the finished exchange so the next request carries it.
    fn commit(&mut self) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(HistoryTurn::user(std::mem::take(&mut self.prompt)));
        history.push(HistoryTurn::model(std::mem::take(&mut self.reply)));

        tracing::debug!(
            history_len = history.len(),
            finish_reason = ?self.finish_reason,
            prompt_tokens = self.usage.as_ref().map(|u| u.prompt_token_count),
            output_tokens = self.usage.as_ref().map(|u| u.candidates_token_count),
            thought_tokens = self.usage.as_ref().map(|u| u.thoughts_token_count),
            "Gemini reply committed to history"
        );
    }
}

/// Turn a raw SSE body into text fragments.
///
/// History is only extended when the body closes cleanly.
pub(crate) fn fragment_stream(
    body: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    history: Arc<Mutex<Vec<HistoryTurn>>>,
    prompt: String,
) -> FragmentStream {
    let state = ReplyState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        reply: String::new(),
        phase: Phase::Open,
        history,
        prompt,
        usage: None,
        finish_reason: None,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                state.reply.push_str(&fragment);
                return Some((Ok(fragment), state));
            }
            match state.phase {
                Phase::Closed => {
                    state.commit();
                    return None;
                }
                Phase::Failed => return None,
                Phase::Open => {}
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    if let Err(error) = state.absorb_all(payloads) {
                        state.fail();
                        return Some((Err(error), state));
                    }
                }
                Some(Err(error)) => {
                    state.fail();
                    return Some((Err(error), state));
                }
                None => {
                    state.phase = Phase::Closed;
                    if let Some(payload) = state.decoder.finish() {
                        if let Err(error) = state.absorb(&payload) {
                            state.fail();
                            return Some((Err(error), state));
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn from_turn(turn: &HistoryTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: Some(turn.text.clone()),
                thought: None,
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    thinking_config: GeminiThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    thoughts_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    #[allow(dead_code)]
    code: Option<i32>,
    #[allow(dead_code)]
    status: Option<String>,
}
