//! OpenAI-compatible chat completions backend.
//!
//! Defaults to the GitHub Models inference endpoint.

use futures::future::{self, TryFutureExt};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_TOKENS, SYSTEM_PROMPT, TEMPERATURE, json_body, parse_event, send, sse};
use crate::model::{
    LanguageModel, Message, ModelError, ModelRequest, PromptRole, PromptTurn, transcript,
};

const DEFAULT_BASE_URL: &str = "https://models.github.ai/inference";
const STREAM_DONE: &str = "[DONE]";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiAnswer,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAnswer {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChunk {
    #[serde(default)]
    choices: Vec<ApiChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChunkChoice {
    #[serde(default)]
    delta: ApiAnswer,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
        }
    }
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    fn turn_to_api(turn: PromptTurn) -> ApiMessage {
        let role = match turn.role {
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        };
        ApiMessage {
            role,
            content: turn.text,
        }
    }

    fn api_request(&self, request: ModelRequest<'_>, stream: bool) -> ApiRequest<'_> {
        let system = ApiMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        };
        let messages = std::iter::once(system)
            .chain(transcript(request).into_iter().map(Self::turn_to_api))
            .collect();

        ApiRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    fn http_request(&self, body: &ApiRequest<'_>) -> RequestBuilder {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(body)
    }
}

fn delta_text(data: &str) -> Result<Option<String>, ModelError> {
    let chunk: ApiChunk = parse_event(data)?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok((!text.is_empty()).then_some(text))
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl LanguageModel for OpenAiBackend {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<Message, ModelError> {
        let http = self.http_request(&self.api_request(request, false));
        let response: ApiResponse = json_body(send(http).await?).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?
            .message
            .content
            .unwrap_or_default();
        Ok(Message::assistant(content))
    }

    fn generate_streaming<'s>(
        &'s self,
        request: ModelRequest<'_>,
    ) -> BoxStream<'s, Result<String, ModelError>> {
        let http = self.http_request(&self.api_request(request, true));

        async move {
            let response = send(http).await?;
            Ok::<_, ModelError>(
                sse::data_events(response.bytes_stream())
                    .try_take_while(|data| future::ready(Ok(data.as_str() != STREAM_DONE)))
                    .try_filter_map(|data| future::ready(delta_text(&data))),
            )
        }
        .try_flatten_stream()
        .boxed()
    }
}
