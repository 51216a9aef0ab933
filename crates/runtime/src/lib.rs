//! Conversation runtime for the MCP client.
//!
//! This crate drives a conversation between a language model and the tools
//! of a connected MCP server.
//!
//! # Overview
//!
//! - **LanguageModel**: the model port, implemented by each provider in
//!   [`providers`] and selected at runtime through [`ModelBackend`].
//! - **ToolHost**: the tool boundary, implemented for [`mcp::Session`].
//! - **Orchestrator**: the turn loop. It asks the model, extracts `TOOL:`
//!   invocations from the reply, validates and executes them, and feeds the
//!   results back until the model stops calling tools.
//! - **Client**: a set of named servers plus the model, exposing one
//!   streaming [`Client::query`] per user message.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use mcp::ServerDescriptor;
//! use runtime::{BackendSettings, Client, ConversationHistory, ModelBackend, ProviderKind};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> runtime::Result<()> {
//! let settings = BackendSettings::new(ProviderKind::OpenAi, "ghp_...");
//! let servers = [("fs".to_string(), ServerDescriptor::new("mcp-filesystem"))];
//! let mut client = Client::new(ModelBackend::new(settings), servers);
//! client.connect("fs").await?;
//!
//! let mut history = ConversationHistory::new("List the files in ./docs");
//! let mut chunks = std::pin::pin!(client.query(&mut history, CancellationToken::new()));
//! while let Some(chunk) = chunks.next().await {
//!     print!("{chunk}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod model;
mod orchestrator;
pub mod providers;
pub mod tools;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use error::{Error, Result};
pub use model::{ConversationHistory, LanguageModel, Message, ModelError, ModelRequest, Role};
pub use orchestrator::{Chunk, Orchestrator, OrchestratorConfig, QueryError};
pub use providers::{BackendSettings, ModelBackend, ProviderKind, UnknownProvider};
pub use tools::{ToolHost, ToolInvocation, ToolOutcome};
