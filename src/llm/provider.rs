//! Provider-agnostic LLM types and the [`LlmProvider`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::reasoning::{clean_response, parse_text_tool_call, render_tool_catalogue};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name for [`Role::Tool`] messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::new(Role::Assistant, content.unwrap_or_default())
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub(crate) fn from_openai(reason: Option<&str>, has_tool_calls: bool) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolUse,
            Some("content_filter") => FinishReason::ContentFilter,
            _ if has_tool_calls => FinishReason::ToolUse,
            _ => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ToolCompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tool_choice: Option<String>,
}

impl ToolCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            messages,
            tools,
            temperature: None,
            max_tokens: None,
            tool_choice: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tool_choice(mut self, choice: impl Into<String>) -> Self {
        self.tool_choice = Some(choice.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ToolCompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A language-model backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Plain completion over a message list.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Completion with callable tools.
    ///
    /// The default renders the tool catalogue into the system prompt and
    /// reads a fenced `{"tool": ..., "arguments": ...}` object back out of
    /// the reply, for backends without native tool calling.
    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.tools.is_empty() {
            messages.push(ChatMessage::system(render_tool_catalogue(&req.tools)));
        }
        messages.extend(req.messages.into_iter().map(flatten_tool_turns));

        let response = self
            .complete(CompletionRequest {
                messages,
                temperature: req.temperature,
                max_tokens: req.max_tokens,
            })
            .await?;

        let content = clean_response(&response.content);
        let tool_calls: Vec<ToolCall> = parse_text_tool_call(&content, &req.tools)
            .into_iter()
            .collect();
        let finish_reason = if tool_calls.is_empty() {
            response.finish_reason
        } else {
            FinishReason::ToolUse
        };

        Ok(ToolCompletionResponse {
            content: (!content.is_empty()).then_some(content),
            tool_calls,
            finish_reason,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}

/// Rewrite tool-call turns as plain text for backends that only see text.
fn flatten_tool_turns(msg: ChatMessage) -> ChatMessage {
    match msg.role {
        Role::Tool => ChatMessage::user(format!(
            "Result of tool {}:\n{}",
            msg.name.as_deref().unwrap_or("unknown"),
            msg.content
        )),
        Role::Assistant if msg.tool_calls.is_some() => {
            let calls = msg.tool_calls.unwrap_or_default();
            let rendered: Vec<String> = calls
                .iter()
                .map(|c| {
                    serde_json::json!({"tool": c.name, "arguments": c.arguments}).to_string()
                })
                .collect();
            ChatMessage::assistant(format!("```json\n{}\n```", rendered.join("\n")))
        }
        _ => msg,
    }
}

/// The core's `complete(prompt, temperature) -> text` contract.
///
/// Sends `prompt` as a single user turn (after an optional system prompt)
/// and returns the cleaned reply text.
pub async fn complete_prompt(
    llm: &dyn LlmProvider,
    system: Option<&str>,
    prompt: &str,
    temperature: f32,
) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    let response = llm
        .complete(CompletionRequest::new(messages).with_temperature(temperature))
        .await?;
    Ok(clean_response(&response.content))
}
