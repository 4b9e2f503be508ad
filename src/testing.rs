//! Test doubles for wiring the agent without a live model.
//!
//! - [`ScriptedLlm`]: replays a queue of canned replies and records prompts
//! - [`no_credentials`]: a credential source that never has a key

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};
use crate::sandbox::{CredentialSource, EnvCredentials};

/// An LLM provider that answers from a script.
///
/// Each `complete` call pops the next reply. When the script runs out the
/// call fails with a transient error, which makes over-calling visible in
/// tests. Tool calls go through the default text protocol, so a scripted
/// reply containing a fenced `{"tool": ..., "arguments": ...}` object is
/// read as a tool call.
pub struct ScriptedLlm {
    model_name: String,
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_name: "scripted-model".to_string(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Append a reply to the end of the script.
    pub fn push(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply.into());
    }

    /// Number of completion calls made so far.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The last user turn of every call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let prompt = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt);

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: "script exhausted".to_string(),
            })?;

        Ok(CompletionResponse {
            content: reply,
            finish_reason: FinishReason::Stop,
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

/// A credential source with nothing in it.
pub fn no_credentials() -> Arc<dyn CredentialSource> {
    Arc::new(EnvCredentials::default())
}
