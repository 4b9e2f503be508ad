//! LLM integration for the agent.
//!
//! Two backends are supported:
//! - **Ollama** (`/api/generate`): local models, text-protocol tool calls
//! - **OpenAI-compatible** (`/chat/completions`): API key auth, native tool calls

pub mod extract;
mod ollama;
mod openai_compat;
mod provider;
pub(crate) mod reasoning;
pub(crate) mod retry;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatibleProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition, complete_prompt,
};

use std::sync::Arc;

use crate::config::{LlmBackend, LlmConfig};
use crate::error::LlmError;

/// Create an LLM provider based on configuration.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Ollama => {
            tracing::info!(
                model = %config.model,
                base_url = %config.base_url,
                "Using Ollama generate API"
            );
            Ok(Arc::new(OllamaProvider::new(config.clone())?))
        }
        LlmBackend::OpenAiCompatible => {
            tracing::info!(
                model = %config.model,
                base_url = %config.base_url,
                "Using OpenAI-compatible chat completions API"
            );
            Ok(Arc::new(OpenAiCompatibleProvider::new(config.clone())?))
        }
    }
}
