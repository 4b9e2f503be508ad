//! Ollama provider (`/api/generate`, non-streaming).
//!
//! Ollama's generate endpoint takes one prompt string, so the message list
//! is rendered into a transcript. Tool calling goes through the trait's
//! text protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::llm::retry::with_retries;

const PROVIDER: &str = "ollama";

pub struct OllamaProvider {
    client: Client,
    config: LlmConfig,
}

impl OllamaProvider {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn api_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_request(&self, body: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: PROVIDER.to_string(),
                        timeout: self.config.timeout,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!("Ollama response status: {}", status);

        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {}: {}", status, text),
            });
        }

        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("JSON parse error: {}. Raw: {}", e, text),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (system, prompt) = render_transcript(&req.messages);
        let body = GenerateRequest {
            model: self.config.model.clone(),
            prompt,
            system,
            stream: false,
            options: GenerateOptions {
                temperature: req.temperature.or(Some(self.config.temperature)),
                num_predict: req.max_tokens,
            },
        };

        let response =
            with_retries(PROVIDER, self.config.max_retries, || self.send_request(&body)).await?;

        let finish_reason = match response.done_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            _ => FinishReason::Unknown,
        };

        Ok(CompletionResponse {
            content: response.response,
            finish_reason,
            input_tokens: response.prompt_eval_count.unwrap_or(0),
            output_tokens: response.eval_count.unwrap_or(0),
        })
    }
}

/// Split off system turns and render the rest as a role-tagged transcript.
fn render_transcript(messages: &[ChatMessage]) -> (Option<String>, String) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();

    let prompt = if let [only] = turns.as_slice()
        && only.role == Role::User
    {
        only.content.clone()
    } else {
        turns
            .iter()
            .map(|m| {
                let tag = match m.role {
                    Role::User | Role::System => "User",
                    Role::Assistant => "Assistant",
                    Role::Tool => "Tool",
                };
                format!("{tag}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
            + "\n\nAssistant:"
    };

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, prompt)
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}
