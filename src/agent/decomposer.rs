//! Splits a query into at most three subtasks.

use std::sync::Arc;

use crate::llm::{LlmProvider, complete_prompt};
use crate::prompts;

/// Most subtasks a query is split into.
pub const MAX_SUBTASKS: usize = 3;

/// Subtask used when fetch and visualization steps are folded together.
pub const MERGED_FETCH_AND_VISUALIZE: &str =
    "1. Fetch and visualize the required data to address the query.";

const DATA_KEYWORDS: &[&str] = &["data", "fetch", "api"];
const VISUALIZATION_KEYWORDS: &[&str] = &["visual", "chart", "graph", "plot"];

pub struct TaskDecomposer {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl TaskDecomposer {
    pub fn new(llm: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Decompose `query`. Always returns at least one subtask.
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let system = format!(
            "{}\n\nREMINDER: For the query '{}', give only the minimum number of subtasks (1-2 ideally).",
            prompts::TASK_ANALYZER,
            query
        );
        match complete_prompt(self.llm.as_ref(), Some(&system), query, self.temperature).await {
            Ok(response) => {
                let subtasks = parse_subtasks(&response, query);
                tracing::info!(count = subtasks.len(), "Decomposed query into subtasks");
                subtasks
            }
            Err(e) => {
                tracing::warn!("Task decomposition failed, using the query as-is: {}", e);
                vec![query.trim().to_string()]
            }
        }
    }
}

fn mentions(line: &str, keywords: &[&str]) -> bool {
    let lower = line.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// Turn a model reply into a bounded subtask list.
///
/// More than three lines that mix data fetching with visualization are
/// folded into one combined subtask, keeping unrelated lines after it.
pub fn parse_subtasks(response: &str, query: &str) -> Vec<String> {
    let lines: Vec<String> = response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        let literal = response.trim();
        let fallback = if literal.is_empty() { query.trim() } else { literal };
        return vec![fallback.to_string()];
    }

    let mut subtasks = lines;
    if subtasks.len() > MAX_SUBTASKS
        && subtasks.iter().any(|l| mentions(l, DATA_KEYWORDS))
        && subtasks.iter().any(|l| mentions(l, VISUALIZATION_KEYWORDS))
    {
        let unrelated = subtasks
            .into_iter()
            .filter(|l| !mentions(l, DATA_KEYWORDS) && !mentions(l, VISUALIZATION_KEYWORDS));
        subtasks = std::iter::once(MERGED_FETCH_AND_VISUALIZE.to_string())
            .chain(unrelated)
            .collect();
        tracing::debug!(count = subtasks.len(), "Merged fetch and visualization subtasks");
    }

    subtasks.truncate(MAX_SUBTASKS);
    subtasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_list_kept() {
        let subtasks = parse_subtasks(
            "1. Create a calculator that performs basic arithmetic operations.\n",
            "Perform addition of 5 and 19",
        );
        assert_eq!(
            subtasks,
            vec!["1. Create a calculator that performs basic arithmetic operations."]
        );
    }

    #[test]
    fn test_fetch_and_visualize_merged() {
        let response = "1. Call the stock API\n2. Fetch price data\n3. Summarize the news headlines\n4. Plot a chart of the prices\n5. Write a report";
        let subtasks = parse_subtasks(response, "q");
        assert_eq!(
            subtasks,
            vec![
                MERGED_FETCH_AND_VISUALIZE.to_string(),
                "3. Summarize the news headlines".to_string(),
                "5. Write a report".to_string(),
            ]
        );
    }

    #[test]
    fn test_long_unrelated_list_truncated() {
        let subtasks = parse_subtasks("a\nb\n\nc\nd\ne", "q");
        assert_eq!(subtasks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_reply_falls_back_to_query() {
        assert_eq!(parse_subtasks("  \n\n", " add 5 and 19 "), vec!["add 5 and 19"]);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_query() {
        let decomposer = TaskDecomposer::new(Arc::new(ScriptedLlm::new(Vec::<String>::new())), 0.1);
        assert_eq!(decomposer.decompose("add 5 and 19").await, vec!["add 5 and 19"]);
    }
}
