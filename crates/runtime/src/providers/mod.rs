//! LLM provider adapters.
//!
//! Each provider implements [`LanguageModel`] for its specific API.
//! [`ModelBackend`] picks one of them from configuration.

mod anthropic;
mod gemini;
mod openai;
mod sse;

use std::fmt;
use std::str::FromStr;

use futures::stream::BoxStream;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
pub use gemini::{GeminiBackend, GeminiBackendBuilder};
pub use openai::{OpenAiBackend, OpenAiBackendBuilder};

use crate::model::{LanguageModel, Message, ModelError, ModelRequest};

/// System prompt sent with every request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
/// Sampling temperature used by every backend.
pub const TEMPERATURE: f32 = 0.2;
/// Default completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 3000;

/// Which provider API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "openai/gpt-4.1",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "GITHUB_TOKEN",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        })
    }
}

/// A provider name that is not one of [`ProviderKind`]'s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider `{0}` (expected openai, anthropic or gemini)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Resolved settings for building a backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// API root override; the provider's public endpoint otherwise.
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl BackendSettings {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: api_key.into(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// The configured language model, one variant per provider.
pub enum ModelBackend {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
    Gemini(GeminiBackend),
}

impl ModelBackend {
    pub fn new(settings: BackendSettings) -> Self {
        let BackendSettings {
            provider,
            model,
            api_key,
            base_url,
            max_tokens,
        } = settings;

        match provider {
            ProviderKind::OpenAi => {
                let mut builder = OpenAiBackend::builder(api_key, model).max_tokens(max_tokens);
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                Self::OpenAi(builder.build())
            }
            ProviderKind::Anthropic => {
                let mut builder = AnthropicBackend::builder(api_key, model).max_tokens(max_tokens);
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                Self::Anthropic(builder.build())
            }
            ProviderKind::Gemini => {
                let mut builder = GeminiBackend::builder(api_key, model).max_tokens(max_tokens);
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                Self::Gemini(builder.build())
            }
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::OpenAi(_) => ProviderKind::OpenAi,
            Self::Anthropic(_) => ProviderKind::Anthropic,
            Self::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi(backend) => fmt::Display::fmt(backend, f),
            Self::Anthropic(backend) => fmt::Display::fmt(backend, f),
            Self::Gemini(backend) => fmt::Display::fmt(backend, f),
        }
    }
}

impl LanguageModel for ModelBackend {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<Message, ModelError> {
        match self {
            Self::OpenAi(backend) => backend.generate(request).await,
            Self::Anthropic(backend) => backend.generate(request).await,
            Self::Gemini(backend) => backend.generate(request).await,
        }
    }

    fn generate_streaming<'s>(
        &'s self,
        request: ModelRequest<'_>,
    ) -> BoxStream<'s, Result<String, ModelError>> {
        match self {
            Self::OpenAi(backend) => backend.generate_streaming(request),
            Self::Anthropic(backend) => backend.generate_streaming(request),
            Self::Gemini(backend) => backend.generate_streaming(request),
        }
    }
}

/// Send a request and turn transport failures and error statuses into
/// [`ModelError`]s.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ModelError> {
    let response = request
        .send()
        .await
        .map_err(|e| ModelError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, "provider request failed");
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> ModelError {
    let detail = format!("{status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited(detail),
        _ => ModelError::Api(detail),
    }
}

/// Decode a JSON body, mapping failures to [`ModelError::InvalidResponse`].
pub(crate) async fn json_body<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, ModelError> {
    response
        .json()
        .await
        .map_err(|e| ModelError::InvalidResponse(e.to_string()))
}

pub(crate) fn parse_event<T: serde::de::DeserializeOwned>(data: &str) -> Result<T, ModelError> {
    serde_json::from_str(data)
        .map_err(|e| ModelError::InvalidResponse(format!("{e} in event `{data}`")))
}
