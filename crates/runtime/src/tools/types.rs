//! Tool-related types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where an invocation was found in the model's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationSource {
    /// A well-formed `TOOL:` / `PARAMETERS:` block.
    Marker,
    /// A loose "use the tool" mention; arguments are guessed as empty.
    Fallback,
}

/// A tool call extracted from model output, not yet validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub source: InvocationSource,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            source: InvocationSource::Marker,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == InvocationSource::Fallback
    }
}

/// The result of executing one invocation, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    /// Arguments as sent, after coercion.
    pub arguments: Map<String, Value>,
    pub success: bool,
    /// What the server returned, untouched; the error text on failure.
    pub payload: Value,
    /// Readable rendering of `payload`.
    pub display: String,
}

impl ToolOutcome {
    /// A failed outcome; the cause text becomes the payload.
    pub fn failure(
        tool: impl Into<String>,
        arguments: Map<String, Value>,
        cause: impl std::fmt::Display,
    ) -> Self {
        let tool = tool.into();
        let description = cause.to_string();
        Self {
            display: format!("Error executing tool '{tool}': {description}"),
            payload: Value::String(description),
            tool,
            arguments,
            success: false,
        }
    }
}
