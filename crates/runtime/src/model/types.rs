//! Core conversation types (provider-agnostic).
//!
//! These types represent the universal concepts shared across LLM providers.
//! Provider-specific details belong in adapter modules.

use std::future::Future;

use futures::stream::BoxStream;
use mcp::ToolCatalog;
use serde::{Deserialize, Serialize};

use super::errors::ModelError;
use crate::tools::ToolOutcome;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

/// Content of one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    ToolResult { outcome: ToolOutcome },
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    /// Create a message with a role and text content.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text { text: text.into() },
        }
    }

    /// Create a user message with text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message with text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a tool-result message carrying the full outcome.
    pub fn tool_result(outcome: ToolOutcome) -> Self {
        Self {
            role: Role::ToolResult,
            content: Content::ToolResult { outcome },
        }
    }

    /// Text content, or `None` for tool results.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text { text } => Some(text),
            Content::ToolResult { .. } => None,
        }
    }

    /// The tool outcome, if this is a tool-result message.
    pub fn outcome(&self) -> Option<&ToolOutcome> {
        match &self.content {
            Content::ToolResult { outcome } => Some(outcome),
            Content::Text { .. } => None,
        }
    }
}

/// Ordered messages of one query, owned by whoever runs the query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Start a history with the user's query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(query)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append-only; the orchestrator is the only writer.
    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub history: &'a ConversationHistory,
    pub catalog: &'a ToolCatalog,
}

impl<'a> ModelRequest<'a> {
    pub fn new(history: &'a ConversationHistory, catalog: &'a ToolCatalog) -> Self {
        Self { history, catalog }
    }
}

/// The language model port.
///
/// Implementations build their wire request eagerly, so the returned stream
/// borrows only the backend, never the request.
pub trait LanguageModel: Send + Sync {
    /// Produce one complete assistant message.
    fn generate(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<Message, ModelError>> + Send;

    /// Produce the assistant reply as text chunks, in order.
    fn generate_streaming<'s>(
        &'s self,
        request: ModelRequest<'_>,
    ) -> BoxStream<'s, Result<String, ModelError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_starts_with_user_query() {
        let history = ConversationHistory::new("what is 2+3?");
        assert_eq!(history.len(), 1);
        let first = &history.messages()[0];
        assert_eq!(first.role, Role::User);
        assert_eq!(first.text(), Some("what is 2+3?"));
    }

    #[test]
    fn tool_result_message_keeps_outcome() {
        let outcome = ToolOutcome {
            tool: "add".into(),
            arguments: serde_json::Map::new(),
            success: true,
            payload: json!(5),
            display: "5".into(),
        };
        let msg = Message::tool_result(outcome);
        assert_eq!(msg.role, Role::ToolResult);
        assert!(msg.text().is_none());
        assert_eq!(msg.outcome().unwrap().payload, json!(5));
    }
}
