//! A client owning one server session and the model it talks through.

use std::sync::Arc;

use futures::stream::Stream;
use indexmap::IndexMap;
use mcp::{ServerDescriptor, Session, SessionOptions, SessionState, ToolCatalog};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{ConversationHistory, LanguageModel};
use crate::orchestrator::{Chunk, Orchestrator, OrchestratorConfig};

/// Named servers, at most one connected, and a language model.
pub struct Client<M> {
    servers: IndexMap<String, Arc<ServerDescriptor>>,
    session: Session,
    active: Option<String>,
    model: M,
    config: OrchestratorConfig,
}

impl<M: LanguageModel> Client<M> {
    pub fn new(model: M, servers: impl IntoIterator<Item = (String, ServerDescriptor)>) -> Self {
        Self {
            servers: servers
                .into_iter()
                .map(|(name, descriptor)| (name, Arc::new(descriptor)))
                .collect(),
            session: Session::default(),
            active: None,
            model,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the session options. Takes effect on the next connect.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session = Session::new(options);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Configured server names, in configuration order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    /// Name of the connected server, if the session is ready.
    pub fn active_server(&self) -> Option<&str> {
        match self.session.state() {
            SessionState::Ready => self.active.as_deref(),
            _ => None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Connect to `name`, retiring the current connection first.
    pub async fn connect(&mut self, name: &str) -> Result<Arc<ToolCatalog>> {
        let descriptor = self
            .servers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownServer(name.to_string()))?;

        self.active = None;
        self.session.connect(descriptor).await?;
        self.active = Some(name.to_string());

        let catalog = self.session.list_tools()?;
        tracing::info!(server = name, tools = catalog.len(), "connected");
        Ok(catalog)
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
        if let Some(name) = self.active.take() {
            tracing::info!(server = %name, "disconnected");
        }
    }

    /// Tools of the connected server.
    pub fn tools(&self) -> Result<Arc<ToolCatalog>> {
        if self.active.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(self.session.list_tools()?)
    }

    /// Run one query over `history` (seeded with the user's message).
    pub fn query<'a>(
        &'a self,
        history: &'a mut ConversationHistory,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Chunk> + Send + 'a {
        Orchestrator::new(&self.model, &self.session, self.config).run(history, cancel)
    }
}
