//! Rendering of a request into provider-neutral prompt turns.

use mcp::ToolCatalog;

use super::types::{Content, ModelRequest, Role};

/// Which side of the conversation a prompt turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    User,
    Assistant,
}

/// One flattened turn, ready for a provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub text: String,
}

/// Describe the catalog and the call format for the model.
pub fn render_tool_info(catalog: &ToolCatalog) -> String {
    let mut info = String::from("\n\nAvailable tools:\n");
    for tool in catalog {
        info.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        if tool.params.is_empty() {
            continue;
        }
        info.push_str("  Parameters:\n");
        for (name, param) in &tool.params {
            let required = if param.required { " (required)" } else { "" };
            let description = param.description.as_deref().unwrap_or_default();
            info.push_str(&format!(
                "    - {name}{required} [{}]: {description}",
                param.kind
            ));
            if let Some(default) = &param.default {
                info.push_str(&format!(" (default: {default})"));
            }
            info.push('\n');
        }
    }

    info.push_str("\nTo call a tool, use this format in your response:\n");
    info.push_str("TOOL: tool_name\n");
    info.push_str("PARAMETERS: {\"param1\": \"value1\", \"param2\": \"value2\"}\n");
    info
}

/// Flatten the history into alternating turns.
///
/// The catalog description is appended to the first user message, tool
/// results become user turns, and consecutive turns of one role are merged.
pub fn transcript(request: ModelRequest<'_>) -> Vec<PromptTurn> {
    let mut turns: Vec<PromptTurn> = Vec::with_capacity(request.history.len());
    let mut catalog_pending = !request.catalog.is_empty();

    for message in request.history.messages() {
        let (role, text) = match (&message.role, &message.content) {
            (Role::User, Content::Text { text }) => {
                let mut text = text.clone();
                if catalog_pending {
                    text.push_str(&render_tool_info(request.catalog));
                    catalog_pending = false;
                }
                (PromptRole::User, text)
            }
            (Role::Assistant, Content::Text { text }) => {
                if text.trim().is_empty() {
                    continue;
                }
                (PromptRole::Assistant, text.clone())
            }
            (_, Content::ToolResult { outcome }) => {
                let label = if outcome.success {
                    "TOOL RESULT"
                } else {
                    "TOOL ERROR"
                };
                (
                    PromptRole::User,
                    format!("{label}: {}\n{}", outcome.tool, outcome.display),
                )
            }
            (Role::ToolResult, Content::Text { text }) => (PromptRole::User, text.clone()),
        };

        match turns.last_mut() {
            Some(last) if last.role == role => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
            }
            _ => turns.push(PromptTurn { role, text }),
        }
    }

    turns
}
