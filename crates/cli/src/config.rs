//! Configuration loading from mcpclient.toml (or a JSON file).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use mcp::{ServerDescriptor, SessionOptions};
use runtime::{BackendSettings, OrchestratorConfig, ProviderKind, UnknownProvider};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "mcpclient.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// Servers by name, in file order.
    #[serde(default)]
    pub context_servers: IndexMap<String, ServerConfig>,
}

/// Model provider configuration.
#[derive(Debug, Default, Deserialize)]
pub struct BackendConfig {
    /// `openai`, `anthropic` or `gemini`. Defaults to `openai`.
    pub provider: Option<String>,

    /// Model to use; the provider's default otherwise.
    pub model: Option<String>,

    /// API key; the provider's environment variable otherwise.
    pub api_key: Option<String>,

    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrchestratorSection {
    pub max_turns: Option<usize>,
    pub streaming: Option<bool>,
    pub handshake_timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub command: CommandConfig,
}

/// How to launch a server process.
#[derive(Debug, Deserialize)]
pub struct CommandConfig {
    pub path: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: IndexMap<String, EnvValue>,
}

/// An environment value as written in the file. Scalars of any type are
/// passed to the server as their string form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl ServerConfig {
    pub fn descriptor(&self) -> ServerDescriptor {
        let command = &self.command;
        let descriptor = command
            .args
            .iter()
            .fold(ServerDescriptor::new(&command.path), |d, arg| d.arg(arg));
        command
            .env
            .iter()
            .fold(descriptor, |d, (key, value)| d.env(key, value.to_string()))
    }
}

impl Config {
    /// Load configuration from a file. Paths ending in `.json` are read as
    /// JSON, everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse(&content)
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn parse_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.context_servers.keys().map(String::as_str)
    }

    /// Descriptors for every configured server.
    pub fn servers(&self) -> Result<Vec<(String, ServerDescriptor)>, ConfigError> {
        if self.context_servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(self
            .context_servers
            .iter()
            .map(|(name, server)| (name.clone(), server.descriptor()))
            .collect())
    }

    /// Resolve backend settings, reading the API key from the environment
    /// when the file does not carry one.
    pub fn backend_settings(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<BackendSettings, ConfigError> {
        self.resolve_backend(provider, model, |key| std::env::var(key).ok())
    }

    fn resolve_backend(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BackendSettings, ConfigError> {
        let backend = &self.backend;
        let provider: ProviderKind = match provider.or(backend.provider.as_deref()) {
            Some(name) => name.parse()?,
            None => ProviderKind::default(),
        };

        let api_key = backend
            .api_key
            .clone()
            .or_else(|| lookup(provider.api_key_env()))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingAuth {
                provider,
                env: provider.api_key_env(),
            })?;

        let mut settings = BackendSettings::new(provider, api_key);
        if let Some(model) = model.or(backend.model.as_deref()) {
            settings.model = model.to_string();
        }
        settings.base_url = backend.base_url.clone();
        if let Some(max_tokens) = backend.max_tokens {
            settings.max_tokens = max_tokens;
        }
        Ok(settings)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            max_turns: section.max_turns.unwrap_or(defaults.max_turns),
            streaming: section.streaming.unwrap_or(defaults.streaming),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        let section = &self.orchestrator;
        let mut options = SessionOptions::default();
        if let Some(secs) = section.handshake_timeout_secs {
            options = options.handshake_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.call_timeout_secs {
            options = options.call_timeout(Duration::from_secs(secs));
        }
        options
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("authentication not configured for {provider}: set backend.api_key or {env}")]
    MissingAuth {
        provider: ProviderKind,
        env: &'static str,
    },

    #[error(transparent)]
    UnknownProvider(#[from] UnknownProvider),

    #[error("no servers configured under context_servers")]
    NoServers,
}
