//! Code synthesis for missing tools.
//!
//! API tools are written from scraped documentation for the service the
//! tool wraps; every other tool is written straight from its description.
//! Synthesis never returns an error: model failures, missing documentation
//! and unusable output all come back as [`SynthesisOutcome::Failed`].

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::llm::{LlmProvider, complete_prompt, extract};
use crate::prompts;
use crate::sandbox::{CREDENTIAL_PLACEHOLDER, ExecutionMode, SandboxExecutor};
use crate::tools::docs::{DocRetriever, combine_pages};
use crate::tools::requirement::{ToolKind, ToolRequirement, name_tokens};

/// Reason reported when the model's reply holds no usable code.
pub const NO_CODE_FOUND: &str = "no code found";

/// Service name used when nothing better can be inferred.
pub const GENERIC_SERVICE: &str = "generic_api";

/// Longest service name accepted from the model.
const MAX_SERVICE_CHARS: usize = 30;

/// Name tokens that say nothing about which service a tool wraps.
const FILLER_TOKENS: &[&str] = &[
    "api", "tool", "tools", "data", "fetch", "fetcher", "get", "service", "client", "http", "rest",
    "web",
];

static RAW_KEY_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)api_key[ \t]*=[^=\n].*$").expect("valid key assignment regex")
});

/// Everything a synthesis attempt needs to know.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub tool: &'a ToolRequirement,
    /// The user query the tool is for.
    pub query: &'a str,
    /// Reviewer feedback from a rejected attempt.
    pub feedback: Option<&'a str>,
    /// Code of the rejected attempt.
    pub previous_code: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Generated(String),
    Failed(String),
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Generated(_))
    }
}

/// Writes code for tools the registry does not have.
pub struct CodeSynthesizer {
    llm: Arc<dyn LlmProvider>,
    docs: Arc<dyn DocRetriever>,
    temperature: f32,
    max_doc_chars: usize,
    validator: Option<Arc<SandboxExecutor>>,
}

impl CodeSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, docs: Arc<dyn DocRetriever>) -> Self {
        Self {
            llm,
            docs,
            temperature: 0.1,
            max_doc_chars: 10_000,
            validator: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_doc_chars(mut self, max_doc_chars: usize) -> Self {
        self.max_doc_chars = max_doc_chars;
        self
    }

    /// Trial-run generated code before accepting it.
    pub fn with_validator(mut self, executor: Arc<SandboxExecutor>) -> Self {
        self.validator = Some(executor);
        self
    }

    pub async fn synthesize(&self, req: SynthesisRequest<'_>) -> SynthesisOutcome {
        let outcome = match req.tool.kind {
            ToolKind::Api => self.synthesize_api(req).await,
            ToolKind::Visualization | ToolKind::General => self.synthesize_general(req).await,
        };

        let outcome = match outcome {
            Ok(code) => self.validate(code).await,
            Err(reason) => SynthesisOutcome::Failed(reason),
        };

        match &outcome {
            SynthesisOutcome::Generated(code) => tracing::info!(
                tool = %req.tool.name,
                kind = %req.tool.kind,
                lines = code.lines().count(),
                "Generated tool code"
            ),
            SynthesisOutcome::Failed(reason) => tracing::warn!(
                tool = %req.tool.name,
                kind = %req.tool.kind,
                "Tool synthesis failed: {}",
                reason
            ),
        }
        outcome
    }

    async fn synthesize_general(&self, req: SynthesisRequest<'_>) -> Result<String, String> {
        let prompt = prompts::tool_request(req.tool, req.query, req.feedback, req.previous_code);
        let response = complete_prompt(
            self.llm.as_ref(),
            Some(prompts::TOOL_WRITER),
            &prompt,
            self.temperature,
        )
        .await
        .map_err(|e| format!("model request failed: {e}"))?;

        extract::fenced_block(&response, Some("python"))
            .or_else(|| extract::fenced_block(&response, Some("py")))
            .or_else(|| extract::fenced_block(&response, None))
            .ok_or_else(|| NO_CODE_FOUND.to_string())
    }

    async fn synthesize_api(&self, req: SynthesisRequest<'_>) -> Result<String, String> {
        let service = self.identify_service(req.tool, req.query).await;
        let pages = self.docs.find_docs(&service).await;
        if pages.is_empty() {
            return Err(format!("no documentation found for '{service}'"));
        }
        tracing::info!(service = %service, pages = pages.len(), "Using scraped documentation");

        let documentation = combine_pages(&pages, self.max_doc_chars);
        let prompt = prompts::api_tool_request(
            req.tool,
            req.query,
            &service,
            &documentation,
            req.feedback,
            req.previous_code,
        );
        let response = complete_prompt(
            self.llm.as_ref(),
            Some(prompts::API_TOOL_WRITER),
            &prompt,
            self.temperature,
        )
        .await
        .map_err(|e| format!("model request failed: {e}"))?;

        let code = extract::python_code(&response)
            .filter(|c| !c.trim().eq_ignore_ascii_case(NO_CODE_FOUND))
            .ok_or_else(|| NO_CODE_FOUND.to_string())?;
        Ok(ensure_credential_placeholder(&code))
    }

    /// Ask the model which service the tool wraps, falling back to the name.
    async fn identify_service(&self, tool: &ToolRequirement, query: &str) -> String {
        let answer = complete_prompt(
            self.llm.as_ref(),
            Some(prompts::SERVICE_IDENTIFIER),
            &prompts::service_request(tool, query),
            0.0,
        )
        .await;

        match answer {
            Ok(text) => clean_service_name(&text),
            Err(e) => {
                tracing::warn!("Service identification failed: {}", e);
                None
            }
        }
        .or_else(|| service_from_tool_name(&tool.name))
        .unwrap_or_else(|| GENERIC_SERVICE.to_string())
    }

    async fn validate(&self, code: String) -> SynthesisOutcome {
        let Some(validator) = &self.validator else {
            return SynthesisOutcome::Generated(code);
        };
        let result = validator.execute(&code, None, ExecutionMode::Validation).await;
        if result.success {
            SynthesisOutcome::Generated(code)
        } else {
            SynthesisOutcome::Failed(format!("validation run failed: {}", result.output))
        }
    }
}

/// Clean a provider name out of a free-form model answer.
pub fn clean_service_name(answer: &str) -> Option<String> {
    let line = answer.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.split([':', '.', ',', '|', '(']).next().unwrap_or("");
    let line = line.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c.is_whitespace());

    let words: Vec<&str> = line
        .split_whitespace()
        .filter(|w| {
            !matches!(
                w.to_lowercase().as_str(),
                "the" | "using" | "with" | "from" | "api" | "service" | "services" | "data"
                    | "provider"
            )
        })
        .take(2)
        .collect();

    let name = words.join(" ").to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_SERVICE_CHARS {
        None
    } else {
        Some(name)
    }
}

/// Service guess from the tool's own name, e.g. `OpenWeatherMap_API_Tool`.
fn service_from_tool_name(name: &str) -> Option<String> {
    let tokens: Vec<String> = name_tokens(name)
        .into_iter()
        .filter(|t| !FILLER_TOKENS.contains(&t.as_str()))
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(""))
}

/// Give API code a discoverable credential slot.
///
/// Code that already mentions `API_KEY` is left alone. Otherwise the first
/// raw `api_key = ...` assignment is replaced by the placeholder constant,
/// or the constant is prepended when there is no such assignment.
pub fn ensure_credential_placeholder(code: &str) -> String {
    if code.contains("API_KEY") || code.contains(CREDENTIAL_PLACEHOLDER) {
        return code.to_string();
    }

    if RAW_KEY_ASSIGNMENT.is_match(code) {
        return RAW_KEY_ASSIGNMENT
            .replace(code, |caps: &regex::Captures<'_>| {
                let indent = &caps[1];
                format!("{indent}API_KEY = \"{CREDENTIAL_PLACEHOLDER}\"\n{indent}api_key = API_KEY")
            })
            .into_owned();
    }

    format!("API_KEY = \"{CREDENTIAL_PLACEHOLDER}\"\n{code}")
}
