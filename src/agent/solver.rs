//! Final task execution: the model answers the query, calling approved
//! tools through the sandbox as it sees fit.

use std::sync::Arc;

use serde_json::json;

use crate::agent::state::EndState;
use crate::llm::{
    ChatMessage, LlmProvider, ToolCompletionRequest, ToolDefinition, complete_prompt,
};
use crate::prompts;
use crate::sandbox::{ExecutionMode, SandboxExecutor};
use crate::tools::ToolRequirement;

/// The answer and the messages produced while reaching it.
#[derive(Debug, Clone)]
pub struct Solution {
    pub answer: String,
    pub end_state: EndState,
    /// New conversation turns: tool calls, tool results and the answer.
    pub transcript: Vec<ChatMessage>,
}

pub struct TaskSolver {
    llm: Arc<dyn LlmProvider>,
    executor: Arc<SandboxExecutor>,
    temperature: f32,
    max_rounds: u32,
}

impl TaskSolver {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        executor: Arc<SandboxExecutor>,
        temperature: f32,
        max_rounds: u32,
    ) -> Self {
        Self {
            llm,
            executor,
            temperature,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Answer `query` with `tools`. Never fails: model and tool errors end
    /// up in the answer text.
    pub async fn solve(&self, query: &str, tools: &[ToolRequirement]) -> Solution {
        let runnable: Vec<&ToolRequirement> = tools.iter().filter(|t| t.is_executable()).collect();
        if runnable.is_empty() {
            return self.answer_directly(query).await;
        }

        let definitions: Vec<ToolDefinition> = runnable.iter().map(|t| definition(t)).collect();
        let mut messages = vec![ChatMessage::system(prompts::TASK_SOLVER), ChatMessage::user(query)];
        let mut transcript = Vec::new();
        let mut tools_run = 0usize;
        let mut last_result: Option<String> = None;

        for round in 0..self.max_rounds {
            let request = ToolCompletionRequest::new(messages.clone(), definitions.clone())
                .with_temperature(self.temperature);
            let response = match self.llm.complete_with_tools(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(round, "Task solving request failed: {}", e);
                    return finish(
                        format!("Unable to produce a final answer: {e}"),
                        tools_run,
                        transcript,
                    );
                }
            };

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default().trim().to_string();
                return finish(answer, tools_run, transcript);
            }

            let assistant =
                ChatMessage::assistant_with_tool_calls(response.content, response.tool_calls.clone());
            messages.push(assistant.clone());
            transcript.push(assistant);

            for call in response.tool_calls {
                let content = match runnable
                    .iter()
                    .zip(&definitions)
                    .find(|(_, def)| def.name == call.name)
                {
                    Some((tool, _)) => {
                        tracing::info!(tool = %tool.name, round, "Running tool for the model");
                        let result = self
                            .executor
                            .execute(&tool.function, Some(&call.arguments), ExecutionMode::Task)
                            .await;
                        tools_run += 1;
                        result.to_context()
                    }
                    None => format!("Error: unknown tool '{}'", call.name),
                };
                last_result = Some(content.clone());
                let result = ChatMessage::tool_result(call.id, call.name, content);
                messages.push(result.clone());
                transcript.push(result);
            }
        }

        // Out of rounds: ask once more without tools.
        messages.push(ChatMessage::user(
            "Answer the original request now using the tool results above.",
        ));
        let request =
            ToolCompletionRequest::new(messages, Vec::new()).with_temperature(self.temperature);
        let answer = match self.llm.complete_with_tools(request).await {
            Ok(response) => response.content.unwrap_or_default().trim().to_string(),
            Err(e) => {
                tracing::warn!("Final answer request failed: {}", e);
                format!(
                    "Stopped after {} tool rounds. Last tool result: {}",
                    self.max_rounds,
                    last_result.unwrap_or_default()
                )
            }
        };
        finish(answer, tools_run, transcript)
    }

    async fn answer_directly(&self, query: &str) -> Solution {
        let answer = complete_prompt(
            self.llm.as_ref(),
            Some(prompts::TASK_SOLVER),
            query,
            self.temperature,
        )
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Direct answer failed: {}", e);
            format!("Unable to produce a final answer: {e}")
        });
        finish(answer, 0, Vec::new())
    }
}

fn finish(answer: String, tools_run: usize, mut transcript: Vec<ChatMessage>) -> Solution {
    transcript.push(ChatMessage::assistant(answer.clone()));
    Solution {
        answer,
        end_state: if tools_run > 0 {
            EndState::ToolsExecuted
        } else {
            EndState::NoToolsNeeded
        },
        transcript,
    }
}

/// Function-calling definition for a tool. Names are restricted to the
/// characters providers accept.
fn definition(tool: &ToolRequirement) -> ToolDefinition {
    let name: String = tool
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    ToolDefinition {
        name,
        description: tool.description.clone(),
        parameters: json!({
            "type": "object",
            "description": "Arguments are passed to the tool as JSON in the TOOL_ARGS environment variable.",
            "additionalProperties": true
        }),
    }
}
