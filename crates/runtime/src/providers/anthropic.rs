//! Anthropic API backend.

use futures::future::{self, TryFutureExt};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_TOKENS, SYSTEM_PROMPT, TEMPERATURE, json_body, parse_event, send, sse};
use crate::model::{
    LanguageModel, Message, ModelError, ModelRequest, PromptRole, PromptTurn, transcript,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<ApiMessage>,
    temperature: f32,
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
    content: Vec<ApiResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    ContentBlockDelta { delta: ApiDelta },
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicBackendBuilder {
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

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            endpoint: format!("{}/messages", self.base_url.trim_end_matches('/')),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
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
        ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT,
            messages: transcript(request)
                .into_iter()
                .map(Self::turn_to_api)
                .collect(),
            temperature: TEMPERATURE,
            stream,
        }
    }

    fn http_request(&self, body: &ApiRequest<'_>) -> RequestBuilder {
        let accept = if body.stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        self.client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", accept)
            .json(body)
    }

    fn response_text(blocks: Vec<ApiResponseBlock>) -> String {
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(text),
                ApiResponseBlock::Unknown => None,
            })
            .collect()
    }
}

fn event_text(data: &str) -> Result<Option<String>, ModelError> {
    match parse_event(data)? {
        ApiStreamEvent::ContentBlockDelta {
            delta: ApiDelta::TextDelta { text },
        } => Ok(Some(text)),
        ApiStreamEvent::Error { error } => {
            let detail = format!("{}: {}", error.kind, error.message);
            Err(match error.kind.as_str() {
                "authentication_error" | "permission_error" => ModelError::Authentication(detail),
                "rate_limit_error" => ModelError::RateLimited(detail),
                _ => ModelError::Api(detail),
            })
        }
        _ => Ok(None),
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl LanguageModel for AnthropicBackend {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<Message, ModelError> {
        let http = self.http_request(&self.api_request(request, false));
        let response: ApiResponse = json_body(send(http).await?).await?;
        Ok(Message::assistant(Self::response_text(response.content)))
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
                    .try_filter_map(|data| future::ready(event_text(&data))),
            )
        }
        .try_flatten_stream()
        .boxed()
    }
}
