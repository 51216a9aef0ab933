use mcp::ParamType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An invocation that does not satisfy its tool's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ValidationError {
    #[error("unknown tool: {tool}")]
    UnknownTool { tool: String },
    #[error("tool `{tool}` is missing required parameters: {}", missing.join(", "))]
    MissingParams { tool: String, missing: Vec<String> },
    #[error("tool `{tool}`: parameter `{param}` must be {expected}")]
    TypeMismatch {
        tool: String,
        param: String,
        expected: ParamType,
    },
}
