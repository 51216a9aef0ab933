//! Readable rendering of tool result payloads.

use mcp::ToolContent;
use serde_json::Value;

const DATA_PREVIEW_CHARS: usize = 20;

/// Render a raw result payload for display. Never fails.
pub fn format_payload(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(format_content)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => pretty(payload),
        },
        other => pretty(other),
    }
}

fn format_content(item: &Value) -> String {
    match serde_json::from_value::<ToolContent>(item.clone()) {
        Ok(ToolContent::Text { text }) => text,
        Ok(ToolContent::Image { data, .. } | ToolContent::Audio { data, .. }) => {
            let preview: String = data.chars().take(DATA_PREVIEW_CHARS).collect();
            format!("[Image/Data: {preview}...]")
        }
        Ok(ToolContent::Resource { resource }) => resource.text.unwrap_or(resource.uri),
        Ok(ToolContent::Unknown) | Err(_) => match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_blocks_are_joined() {
        let payload = json!({"content": [
            {"type": "text", "text": "line one"},
            {"type": "text", "text": "line two"}
        ]});
        assert_eq!(format_payload(&payload), "line one\nline two");
    }

    #[test]
    fn binary_blocks_are_previewed() {
        let payload = json!({"content": [
            {"type": "image", "data": "iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB", "mimeType": "image/png"}
        ]});
        assert_eq!(format_payload(&payload), "[Image/Data: iVBORw0KGgoAAAANSUhE...]");
    }

    #[test]
    fn resources_render_text_or_uri() {
        let payload = json!({"content": [
            {"type": "resource", "resource": {"uri": "file:///a.txt", "text": "hello"}},
            {"type": "resource", "resource": {"uri": "file:///b.bin"}}
        ]});
        assert_eq!(format_payload(&payload), "hello\nfile:///b.bin");
    }

    #[test]
    fn other_shapes_fall_back_to_json() {
        assert_eq!(format_payload(&json!("plain")), "plain");
        assert_eq!(format_payload(&json!(5)), "5");
        assert_eq!(format_payload(&json!([1, 2])), "[\n  1,\n  2\n]");
        assert_eq!(format_payload(&json!({"content": "inline"})), "inline");
        assert_eq!(format_payload(&json!({"sum": 5})), "{\n  \"sum\": 5\n}");
        assert_eq!(
            format_payload(&json!({"content": [{"weird": true}]})),
            "{\"weird\":true}"
        );
    }
}
