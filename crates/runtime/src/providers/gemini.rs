//! Google Generative Language (Gemini) backend.

use futures::future::{self, TryFutureExt};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_TOKENS, SYSTEM_PROMPT, TEMPERATURE, json_body, parse_event, send, sse};
use crate::model::{
    LanguageModel, Message, ModelError, ModelRequest, PromptRole, PromptTurn, transcript,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    system_instruction: ApiContent,
    contents: Vec<ApiContent>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
}

impl ApiResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl GeminiBackendBuilder {
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

    pub fn build(self) -> GeminiBackend {
        GeminiBackend {
            client: reqwest::Client::new(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
        }
    }
}

/// Gemini backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl GeminiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> GeminiBackendBuilder {
        GeminiBackendBuilder::new(api_key, model)
    }

    fn text_content(role: Option<&str>, text: String) -> ApiContent {
        ApiContent {
            role: role.map(str::to_string),
            parts: vec![ApiPart { text: Some(text) }],
        }
    }

    fn turn_to_api(turn: PromptTurn) -> ApiContent {
        let role = match turn.role {
            PromptRole::User => "user",
            PromptRole::Assistant => "model",
        };
        Self::text_content(Some(role), turn.text)
    }

    fn api_request(&self, request: ModelRequest<'_>) -> ApiRequest {
        ApiRequest {
            system_instruction: Self::text_content(None, SYSTEM_PROMPT.to_string()),
            contents: transcript(request)
                .into_iter()
                .map(Self::turn_to_api)
                .collect(),
            generation_config: ApiGenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: self.max_tokens,
            },
        }
    }

    fn url(&self, streaming: bool) -> String {
        if streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, self.model)
        }
    }

    fn http_request(&self, request: ModelRequest<'_>, streaming: bool) -> RequestBuilder {
        self.client
            .post(self.url(streaming))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.api_request(request))
    }
}

fn event_text(data: &str) -> Result<Option<String>, ModelError> {
    let text = parse_event::<ApiResponse>(data)?.text();
    Ok((!text.is_empty()).then_some(text))
}

impl std::fmt::Display for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gemini({})", self.model)
    }
}

impl LanguageModel for GeminiBackend {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<Message, ModelError> {
        let http = self.http_request(request, false);
        let response: ApiResponse = json_body(send(http).await?).await?;
        Ok(Message::assistant(response.text()))
    }

    fn generate_streaming<'s>(
        &'s self,
        request: ModelRequest<'_>,
    ) -> BoxStream<'s, Result<String, ModelError>> {
        let http = self.http_request(request, true);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConversationHistory;
    use mcp::ToolCatalog;
    use serde_json::json;

    #[test]
    fn request_body_maps_roles() {
        let backend = GeminiBackend::builder("key", "gemini-2.0-flash").build();
        let mut history = ConversationHistory::new("hi");
        history.push(Message::assistant("hello"));
        let catalog = ToolCatalog::default();

        let body = serde_json::to_value(backend.api_request(ModelRequest::new(&history, &catalog)))
            .unwrap();
        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "You are a helpful assistant."}]})
        );
        assert_eq!(
            body["contents"],
            json!([
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]}
            ])
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
    }

    #[test]
    fn urls() {
        let backend = GeminiBackend::builder("key", "gemini-2.0-flash")
            .base_url("http://localhost:9000/")
            .build();
        assert_eq!(
            backend.url(false),
            "http://localhost:9000/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            backend.url(true),
            "http://localhost:9000/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn stream_events() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"},{"text":" there"}]}}]}"#;
        assert_eq!(event_text(data).unwrap().as_deref(), Some("Hi there"));

        let finish = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{}}"#;
        assert_eq!(event_text(finish).unwrap(), None);
    }
}
