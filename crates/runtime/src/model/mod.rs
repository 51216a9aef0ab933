//! Conversation types and the language model port.

pub mod errors;
pub mod prompt;
pub mod types;

pub use errors::ModelError;
pub use prompt::{PromptRole, PromptTurn, render_tool_info, transcript};
pub use types::{Content, ConversationHistory, LanguageModel, Message, ModelRequest, Role};
