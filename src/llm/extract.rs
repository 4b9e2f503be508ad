//! Best-effort extraction of structured pieces from model output.
//!
//! Model formatting is not contractually fixed, so nothing here is
//! guaranteed to find what the model meant. The contracts are:
//!
//! - [`fenced_block`]: the first fenced block whose info string matches the
//!   requested language (case-insensitive), or the first fenced block of any
//!   language when `None` is given.
//! - [`json_array`]: the first ```` ```json ```` block, else the first
//!   bracketed array of objects found by a non-greedy scan.
//! - [`python_code`]: any fenced block, else Python-looking lines picked out
//!   by line classification.

use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+.-]*)[^\n]*\n(.*?)```").expect("valid fence regex")
});

static BRACKETED_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*?\}\s*\]").expect("valid array regex"));

static CODE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(import\s|from\s+\S+\s+import\s|def\s|class\s|async\s+def\s|@|if\s+__name__|if\s|elif\s|else:|try:|except\b|finally:|with\s|for\s|while\s|return\b|raise\b|print\(|[A-Za-z_][A-Za-z0-9_\.\[\]'\x22]*\s*[+\-*/]?=|#)",
    )
    .expect("valid code line regex")
});

/// Extract the body of the first fenced block tagged `lang`.
pub fn fenced_block(text: &str, lang: Option<&str>) -> Option<String> {
    FENCE.captures_iter(text).find_map(|caps| {
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let wanted = match lang {
            Some(lang) => tag.eq_ignore_ascii_case(lang),
            None => true,
        };
        (wanted && !body.trim().is_empty()).then(|| body.trim_end().to_string())
    })
}

/// Extract a JSON array of objects from model output.
pub fn json_array(text: &str) -> Option<serde_json::Value> {
    if let Some(block) = fenced_block(text, Some("json"))
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(block.trim())
    {
        return Some(match value {
            serde_json::Value::Array(_) => value,
            other => serde_json::Value::Array(vec![other]),
        });
    }

    BRACKETED_ARRAY
        .find_iter(text)
        .find_map(|m| serde_json::from_str::<serde_json::Value>(m.as_str()).ok())
        .filter(|v| v.is_array())
}

/// Extract runnable Python from model output.
///
/// Fenced blocks win and are joined in order. Without fences, lines are
/// kept from the first line that looks like code, along with indented and
/// blank lines inside code regions.
pub fn python_code(text: &str) -> Option<String> {
    let blocks: Vec<String> = FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str().trim_end().to_string())
        .filter(|b| !b.trim().is_empty())
        .collect();
    if !blocks.is_empty() {
        return Some(blocks.join("\n\n"));
    }

    let mut kept = Vec::new();
    let mut in_code = false;
    for line in text.lines() {
        let trimmed = line.trim_start();
        let indented = line.len() != trimmed.len();
        if CODE_LINE.is_match(trimmed) || (in_code && (indented || trimmed.is_empty())) {
            in_code = true;
            kept.push(line);
        } else {
            in_code = false;
        }
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    let has_structure = kept.iter().any(|l| {
        let t = l.trim_start();
        t.starts_with("import ") || t.starts_with("from ") || t.starts_with("def ")
    });
    (has_structure && !kept.is_empty()).then(|| kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fenced_block_by_language() {
        let text = "intro\n```text\nnot this\n```\n```python\nprint(1)\n```\n";
        assert_eq!(fenced_block(text, Some("python")).as_deref(), Some("print(1)"));
        assert_eq!(fenced_block(text, None).as_deref(), Some("not this"));
        assert_eq!(fenced_block(text, Some("rust")), None);
    }

    #[test]
    fn test_json_array_from_fence() {
        let text = "Here:\n```json\n[{\"name\": \"A\", \"description\": \"a\"}]\n```";
        let value = json_array(text).unwrap();
        assert_eq!(value[0]["name"], "A");
    }

    #[test]
    fn test_json_array_single_object_is_wrapped() {
        let text = "```json\n{\"name\": \"A\", \"description\": \"a\"}\n```";
        let value = json_array(text).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_json_array_regex_fallback() {
        let text = "I think you need [ {\"name\": \"B\", \"description\": \"b\"} ] for this.";
        let value = json_array(text).unwrap();
        assert_eq!(value[0]["name"], "B");
    }

    #[test]
    fn test_json_array_garbage() {
        assert!(json_array("no tools needed").is_none());
        assert!(json_array("```json\nnot json\n```").is_none());
    }

    #[test]
    fn test_python_code_joins_fences() {
        let text = "```python\nimport os\n```\nthen\n```\nprint(os.name)\n```";
        assert_eq!(python_code(text).unwrap(), "import os\n\nprint(os.name)");
    }

    #[test]
    fn test_python_code_heuristic() {
        let text = "Sure, here is the tool.\nimport requests\n\ndef fetch(city):\n    return requests.get(city)\n\nThat should work.";
        let code = python_code(text).unwrap();
        assert!(code.starts_with("import requests"));
        assert!(code.contains("    return requests.get(city)"));
        assert!(!code.contains("That should work"));
        assert!(!code.contains("Sure"));
    }

    #[test]
    fn test_python_code_prose_only() {
        assert_eq!(python_code("I could not find any usable endpoint."), None);
    }
}
