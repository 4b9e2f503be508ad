//! Cleanup of raw model text and the text-based tool-call protocol.

use crate::llm::extract::fenced_block;
use crate::llm::provider::{ToolCall, ToolDefinition};

const THINK_TAGS: [(&str, &str); 2] = [("<think>", "</think>"), ("<thinking>", "</thinking>")];

/// Clean up an LLM response by stripping reasoning blocks.
pub(crate) fn clean_response(text: &str) -> String {
    let mut text = text.to_string();
    for (open, close) in THINK_TAGS {
        text = strip_tag_blocks(&text, open, close);
    }

    // Reasoning models sometimes emit only the closing tag.
    for (_, close) in THINK_TAGS {
        if let Some(idx) = text.rfind(close) {
            text = text[idx + close.len()..].to_string();
        }
    }

    let mut cleaned = text.trim().to_string();
    while cleaned.contains("\n\n\n") {
        cleaned = cleaned.replace("\n\n\n", "\n\n");
    }
    cleaned
}

/// Remove `open ... close` blocks. An unclosed block discards the rest.
fn strip_tag_blocks(text: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut remaining = text;

    while let Some(start) = remaining.find(open) {
        result.push_str(&remaining[..start]);
        match remaining[start..].find(close) {
            Some(end_offset) => remaining = &remaining[start + end_offset + close.len()..],
            None => {
                remaining = "";
                break;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// System prompt describing the tools to a backend without native tool calling.
pub(crate) fn render_tool_catalogue(tools: &[ToolDefinition]) -> String {
    let mut out = String::from(
        "You can call the following tools. To call one, reply with ONLY a fenced json \
         block of the form {\"tool\": \"<name>\", \"arguments\": {...}}. When you have \
         enough information, answer in plain text instead.\n\nTools:\n",
    );
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    out
}

/// Parse a text-protocol tool call. Unknown tool names are ignored.
pub(crate) fn parse_text_tool_call(text: &str, tools: &[ToolDefinition]) -> Option<ToolCall> {
    let body = fenced_block(text, Some("json"))?;
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let name = value.get("tool")?.as_str()?;
    if !tools.iter().any(|t| t.name == name) {
        return None;
    }

    let arguments = value
        .get("arguments")
        .cloned()
        .filter(|a| a.is_object())
        .unwrap_or_else(|| serde_json::json!({}));

    Some(ToolCall {
        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder() -> ToolDefinition {
        ToolDefinition {
            name: "Adder".to_string(),
            description: "adds".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(clean_response("<think>hmm</think>\n\nAnswer: 24"), "Answer: 24");
        assert_eq!(clean_response("a<thinking>x</thinking>b"), "ab");
        assert_eq!(clean_response("keep<think>never closed"), "keep");
        assert_eq!(clean_response("stray reasoning</think>final"), "final");
    }

    #[test]
    fn test_collapse_blank_runs() {
        assert_eq!(clean_response("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_parse_text_tool_call() {
        let text = "```json\n{\"tool\": \"Adder\", \"arguments\": {\"a\": 5, \"b\": 19}}\n```";
        let call = parse_text_tool_call(text, &[adder()]).unwrap();
        assert_eq!(call.name, "Adder");
        assert_eq!(call.arguments["b"], 19);
        assert!(call.id.starts_with("call_"));
    }

    #[test]
    fn test_parse_text_tool_call_rejects_unknown_and_plain_text() {
        let unknown = "```json\n{\"tool\": \"Rm\", \"arguments\": {}}\n```";
        assert!(parse_text_tool_call(unknown, &[adder()]).is_none());
        assert!(parse_text_tool_call("The answer is 24.", &[adder()]).is_none());
    }

    #[test]
    fn test_catalogue_lists_tools() {
        let text = render_tool_catalogue(&[adder()]);
        assert!(text.contains("- Adder: adds"));
    }
}
