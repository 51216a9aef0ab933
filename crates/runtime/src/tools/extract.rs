//! Tool call extraction from model text.
//!
//! The primary format is a two-line block:
//!
//! ```text
//! TOOL: add
//! PARAMETERS: {"a": 2, "b": 3}
//! ```
//!
//! Blocks are found by a small scanner: locate the marker, read the tool
//! name, require a line break, then let a streaming JSON deserializer parse
//! exactly one value and report where it ended. Unparsable blocks are
//! recorded as diagnostics and skipped.

use std::iter::FusedIterator;

use mcp::ToolCatalog;
use serde_json::{Map, Value};

use super::types::{InvocationSource, ToolInvocation};

const TOOL_MARKER: &str = "TOOL:";
const PARAMS_MARKER: &str = "PARAMETERS:";

/// A marker block that could not be turned into an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDiagnostic {
    /// Byte offset of the block's `TOOL:` marker.
    pub offset: usize,
    pub tool: String,
    pub reason: String,
}

/// Lazily scan `text` for tool invocations.
pub fn extract<'a>(text: &'a str, catalog: &'a ToolCatalog) -> Extraction<'a> {
    Extraction {
        text,
        catalog,
        pos: 0,
        yielded: 0,
        fallback_done: false,
        diagnostics: Vec::new(),
    }
}

/// Iterator over the invocations in one text, in order of appearance.
///
/// Marker blocks come first; only when none parsed does the loose
/// "use the tool" mention get a chance, yielding at most one invocation.
#[derive(Debug)]
pub struct Extraction<'a> {
    text: &'a str,
    catalog: &'a ToolCatalog,
    pos: usize,
    yielded: usize,
    fallback_done: bool,
    diagnostics: Vec<ExtractionDiagnostic>,
}

impl Extraction<'_> {
    /// Blocks skipped so far.
    pub fn diagnostics(&self) -> &[ExtractionDiagnostic] {
        &self.diagnostics
    }

    fn next_marker(&mut self) -> Option<ToolInvocation> {
        let text = self.text;
        while self.pos < text.len() {
            let Some(found) = text[self.pos..].find(TOOL_MARKER) else {
                self.pos = text.len();
                break;
            };
            let start = self.pos + found;
            let mut cursor = skip_while(text, start + TOOL_MARKER.len(), |b| b == b' ' || b == b'\t');

            let name_end = skip_while(text, cursor, |b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
            if name_end == cursor {
                self.pos = cursor;
                continue;
            }
            let name = &text[cursor..name_end];
            cursor = name_end;

            let gap_end = skip_while(text, cursor, |b| b.is_ascii_whitespace());
            let has_break = text[cursor..gap_end].contains(['\n', '\r']);
            if !has_break || !text[gap_end..].starts_with(PARAMS_MARKER) {
                self.pos = cursor;
                continue;
            }
            cursor = self.skip_fence(gap_end + PARAMS_MARKER.len());

            let mut values = serde_json::Deserializer::from_str(&text[cursor..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(Value::Object(arguments))) => {
                    self.pos = cursor + values.byte_offset();
                    self.yielded += 1;
                    return Some(ToolInvocation::new(name, arguments));
                }
                Some(Ok(other)) => {
                    self.pos = cursor + values.byte_offset();
                    self.skip(start, name, format!("arguments must be a JSON object, got `{other}`"));
                }
                Some(Err(e)) => {
                    self.pos = cursor;
                    self.skip(start, name, e.to_string());
                }
                None => {
                    self.pos = text.len();
                    self.skip(start, name, "missing arguments".to_string());
                }
            }
        }
        None
    }

    /// Skip whitespace and an optional backtick fence with a `json` tag.
    fn skip_fence(&self, from: usize) -> usize {
        let text = self.text;
        let mut cursor = skip_while(text, from, |b| b.is_ascii_whitespace());
        let fence_end = skip_while(text, cursor, |b| b == b'`');
        if fence_end > cursor {
            cursor = fence_end;
            if text[cursor..].starts_with("json") {
                cursor += "json".len();
            }
            cursor = skip_while(text, cursor, |b| b.is_ascii_whitespace());
        }
        cursor
    }

    fn skip(&mut self, offset: usize, tool: &str, reason: String) {
        tracing::warn!(tool, offset, "skipping malformed tool call: {reason}");
        self.diagnostics.push(ExtractionDiagnostic {
            offset,
            tool: tool.to_string(),
            reason,
        });
    }

    fn fallback(&mut self) -> Option<ToolInvocation> {
        self.fallback_done = true;
        let haystack = self.text.to_lowercase();

        let mut best: Option<(usize, &str)> = None;
        for tool in self.catalog {
            let name = tool.name.to_lowercase();
            let phrases = [
                format!("use the {name} tool"),
                format!("use the tool {name}"),
                format!("use the `{name}` tool"),
                format!("use the tool `{name}`"),
            ];
            let Some(at) = phrases.iter().filter_map(|p| haystack.find(p.as_str())).min() else {
                continue;
            };
            if best.is_none_or(|(earliest, _)| at < earliest) {
                best = Some((at, tool.name.as_str()));
            }
        }

        best.map(|(_, name)| {
            tracing::debug!(tool = name, "no marker block, using loose tool mention");
            ToolInvocation {
                name: name.to_string(),
                arguments: Map::new(),
                source: InvocationSource::Fallback,
            }
        })
    }
}

impl Iterator for Extraction<'_> {
    type Item = ToolInvocation;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(invocation) = self.next_marker() {
            return Some(invocation);
        }
        if self.yielded == 0 && !self.fallback_done {
            return self.fallback();
        }
        None
    }
}

impl FusedIterator for Extraction<'_> {}

fn skip_while(text: &str, from: usize, pred: impl Fn(u8) -> bool) -> usize {
    text.as_bytes()[from..]
        .iter()
        .position(|&b| !pred(b))
        .map_or(text.len(), |n| from + n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::Tool;
    use serde_json::json;

    fn catalog(names: &[&str]) -> ToolCatalog {
        ToolCatalog::from(
            names
                .iter()
                .map(|name| Tool {
                    name: name.to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                })
                .collect::<Vec<_>>(),
        )
    }

    fn names(text: &str, catalog: &ToolCatalog) -> Vec<String> {
        extract(text, catalog).map(|i| i.name).collect()
    }

    #[test]
    fn single_block() {
        let catalog = catalog(&["add"]);
        let calls: Vec<_> = extract("TOOL: add\nPARAMETERS: {\"a\": 2, \"b\": 3}", &catalog).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add");
        assert_eq!(calls[0].source, InvocationSource::Marker);
        assert_eq!(Value::Object(calls[0].arguments.clone()), json!({"a": 2, "b": 3}));
    }

    #[test]
    fn blocks_are_yielded_in_text_order() {
        let catalog = catalog(&[]);
        let text = "First I'll read.\nTOOL: read_file\nPARAMETERS: {\"path\": \"a}b\"}\n\
                    Then list.\n\nTOOL: list-dir\r\n  PARAMETERS:   {\"nested\": {\"x\": [1, 2]}} trailing\n\
                    TOOL: add\nPARAMETERS: {}";
        assert_eq!(names(text, &catalog), ["read_file", "list-dir", "add"]);
    }

    #[test]
    fn fenced_arguments() {
        let catalog = catalog(&[]);
        let text = "TOOL: echo\nPARAMETERS: ```json\n{\"text\": \"hi\"}\n```";
        let calls: Vec<_> = extract(text, &catalog).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["text"], "hi");
    }

    #[test]
    fn malformed_blocks_are_skipped_with_diagnostics() {
        let catalog = catalog(&[]);
        let text = "TOOL: broken\nPARAMETERS: {\"a\": }\nTOOL: list\nPARAMETERS: [1, 2]\nTOOL: ok\nPARAMETERS: {\"x\": 1}";
        let mut extraction = extract(text, &catalog);
        let calls: Vec<_> = extraction.by_ref().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ok");

        let diagnostics = extraction.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].tool, "broken");
        assert_eq!(diagnostics[0].offset, 0);
        assert_eq!(diagnostics[1].tool, "list");
        assert!(diagnostics[1].reason.contains("JSON object"));
    }

    #[test]
    fn marker_needs_line_break_before_parameters() {
        let catalog = catalog(&[]);
        assert!(names("TOOL: add PARAMETERS: {\"a\": 1}", &catalog).is_empty());
        assert!(names("TOOL:\nPARAMETERS: {}", &catalog).is_empty());
    }

    #[test]
    fn truncated_arguments_are_diagnosed() {
        let catalog = catalog(&[]);
        let mut extraction = extract("TOOL: add\nPARAMETERS:", &catalog);
        assert_eq!(extraction.next(), None);
        assert_eq!(extraction.diagnostics()[0].reason, "missing arguments");
    }

    #[test]
    fn fallback_matches_loose_mention() {
        let catalog = catalog(&["add", "read_file"]);
        let calls: Vec<_> = extract("I will Use The READ_FILE Tool to look.", &catalog).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert!(calls[0].is_fallback());
        assert!(calls[0].arguments.is_empty());

        assert_eq!(names("Let me use the tool `add` now", &catalog), ["add"]);
    }

    #[test]
    fn fallback_picks_earliest_mention() {
        let catalog = catalog(&["add", "echo"]);
        let text = "use the echo tool, then use the add tool";
        assert_eq!(names(text, &catalog), ["echo"]);
    }

    #[test]
    fn fallback_never_fires_next_to_a_marker_block() {
        let catalog = catalog(&["add", "echo"]);
        let text = "use the echo tool\nTOOL: add\nPARAMETERS: {\"a\": 1}";
        assert_eq!(names(text, &catalog), ["add"]);
    }

    #[test]
    fn fallback_ignores_unknown_tools_and_plain_text() {
        let catalog = catalog(&["add"]);
        assert!(names("use the subtract tool", &catalog).is_empty());
        assert!(names("The answer is 5.", &catalog).is_empty());
    }

    #[test]
    fn exhausted_extraction_stays_empty() {
        let catalog = catalog(&["add"]);
        let mut extraction = extract("use the add tool", &catalog);
        assert!(extraction.next().is_some());
        assert!(extraction.next().is_none());
        assert!(extraction.next().is_none());
    }
}
