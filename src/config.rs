//! Configuration for toolsmith.
//!
//! Everything is read from the environment (after loading `.env` with
//! dotenvy). Each section resolves itself through the helpers in
//! [`helpers`], so a bad value always names the variable it came from.

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::sandbox::SandboxConfig;
use helpers::{optional_env, parse_bool_env, parse_optional_env, parse_string_env};

/// Main configuration for the agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the registry, sessions and scratch files.
    pub home: PathBuf,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub sandbox: SandboxConfig,
    pub docs: DocsConfig,
    pub registry_path: PathBuf,
    pub sessions_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::resolve()
    }

    fn resolve() -> Result<Self, ConfigError> {
        let home = match optional_env("TOOLSMITH_HOME")? {
            Some(path) => PathBuf::from(path),
            None => default_home()?,
        };

        Ok(Self {
            llm: LlmConfig::resolve()?,
            agent: AgentConfig::resolve()?,
            sandbox: resolve_sandbox(&home)?,
            docs: DocsConfig::resolve()?,
            registry_path: home.join("tool_config.json"),
            sessions_dir: home.join("sessions"),
            home,
        })
    }

    /// Configuration rooted at `home` with every other value at its default.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            sandbox: SandboxConfig::new(home.join("scratch")),
            docs: DocsConfig::default(),
            registry_path: home.join("tool_config.json"),
            sessions_dir: home.join("sessions"),
            home,
        }
    }
}

fn default_home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".toolsmith"))
        .ok_or_else(|| ConfigError::MissingRequired {
            key: "TOOLSMITH_HOME".to_string(),
            hint: "no home directory could be determined; set TOOLSMITH_HOME".to_string(),
        })
}

fn resolve_sandbox(home: &Path) -> Result<SandboxConfig, ConfigError> {
    let defaults = SandboxConfig::new(home.join("scratch"));
    Ok(SandboxConfig {
        interpreter: parse_string_env("SANDBOX_INTERPRETER", defaults.interpreter.clone())?,
        exec_timeout: Duration::from_secs(parse_optional_env(
            "SANDBOX_EXEC_TIMEOUT_SECS",
            defaults.exec_timeout.as_secs(),
        )?),
        validation_timeout: Duration::from_secs(parse_optional_env(
            "SANDBOX_VALIDATION_TIMEOUT_SECS",
            defaults.validation_timeout.as_secs(),
        )?),
        max_output_bytes: parse_optional_env(
            "SANDBOX_MAX_OUTPUT_BYTES",
            defaults.max_output_bytes,
        )?,
        ..defaults
    })
}

/// Which LLM backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmBackend {
    /// Local Ollama instance (`/api/generate`)
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAiCompatible,
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai_compatible" | "openai-compatible" | "openai" | "compatible" => {
                Ok(Self::OpenAiCompatible)
            }
            _ => Err(format!(
                "invalid LLM backend '{s}', expected one of: ollama, openai_compatible"
            )),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

/// LLM backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub temperature: f32,
    pub timeout: Duration,
    /// Retries for 429/5xx responses before giving up.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            temperature: 0.1,
            timeout: Duration::from_secs(180),
            max_retries: 3,
        }
    }
}

impl LlmConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let backend: LlmBackend = match optional_env("LLM_BACKEND")? {
            Some(b) => b.parse().map_err(|e| ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message: e,
            })?,
            None => LlmBackend::default(),
        };

        let (default_url, default_model) = match backend {
            LlmBackend::Ollama => ("http://localhost:11434", "llama3.1"),
            LlmBackend::OpenAiCompatible => ("https://api.openai.com/v1", "gpt-4o-mini"),
        };

        let api_key = optional_env("LLM_API_KEY")?.map(SecretString::from);
        if backend == LlmBackend::OpenAiCompatible && api_key.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "LLM_API_KEY".to_string(),
                hint: "the openai_compatible backend needs an API key".to_string(),
            });
        }

        let temperature: f32 = parse_optional_env("LLM_TEMPERATURE", 0.1)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "LLM_TEMPERATURE".to_string(),
                message: format!("must be between 0.0 and 2.0, got {temperature}"),
            });
        }

        Ok(Self {
            backend,
            base_url: parse_string_env("LLM_BASE_URL", default_url)?,
            model: parse_string_env("LLM_MODEL", default_model)?,
            api_key,
            temperature,
            timeout: Duration::from_secs(parse_optional_env("LLM_TIMEOUT_SECS", 180)?),
            max_retries: parse_optional_env("LLM_MAX_RETRIES", 3)?,
        })
    }
}

/// Agent behavior configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Initial turn budget for tool synthesis.
    pub max_turns: u32,
    /// Upper bound on model/tool round trips in the execute phase.
    pub max_tool_rounds: u32,
    /// Run generated code once before staging it for review.
    pub validate_generated: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            max_tool_rounds: 5,
            validate_generated: false,
        }
    }
}

impl AgentConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let max_turns: u32 = parse_optional_env("AGENT_MAX_TURNS", 5)?;
        if max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_MAX_TURNS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            max_turns,
            max_tool_rounds: parse_optional_env("AGENT_MAX_TOOL_ROUNDS", 5)?,
            validate_generated: parse_bool_env("AGENT_VALIDATE_GENERATED", false)?,
        })
    }
}

/// Documentation retrieval configuration.
#[derive(Debug, Clone)]
pub struct DocsConfig {
    /// Concurrent candidate-URL probes.
    pub probe_concurrency: usize,
    /// Base request timeout, scaled by attempt number when scraping.
    pub timeout: Duration,
    pub max_retries: u32,
    /// Documentation characters handed to the model.
    pub max_chars: usize,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: 5,
            timeout: Duration::from_secs(20),
            max_retries: 3,
            max_chars: 10_000,
        }
    }
}

impl DocsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let probe_concurrency: usize = parse_optional_env("DOCS_PROBE_CONCURRENCY", 5)?;
        Ok(Self {
            probe_concurrency: probe_concurrency.max(1),
            timeout: Duration::from_secs(parse_optional_env("DOCS_TIMEOUT_SECS", 20)?),
            max_retries: parse_optional_env::<u32>("DOCS_MAX_RETRIES", 3)?.max(1),
            max_chars: parse_optional_env("DOCS_MAX_CHARS", 10_000)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::helpers::ENV_MUTEX;

    #[test]
    fn backend_parsing() {
        assert_eq!("Ollama".parse::<LlmBackend>().unwrap(), LlmBackend::Ollama);
        assert_eq!(
            "openai-compatible".parse::<LlmBackend>().unwrap(),
            LlmBackend::OpenAiCompatible
        );
        assert!("bedrock".parse::<LlmBackend>().is_err());
        assert_eq!(LlmBackend::OpenAiCompatible.to_string(), "openai_compatible");
    }

    #[test]
    fn zero_turn_budget_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { std::env::set_var("AGENT_MAX_TURNS", "0") };
        let result = AgentConfig::resolve();
        unsafe { std::env::remove_var("AGENT_MAX_TURNS") };
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn compatible_backend_requires_key() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            std::env::set_var("LLM_BACKEND", "openai_compatible");
            std::env::remove_var("LLM_API_KEY");
        }
        let result = LlmConfig::resolve();
        unsafe { std::env::remove_var("LLM_BACKEND") };
        assert!(matches!(result, Err(ConfigError::MissingRequired { .. })));
    }

    #[test]
    fn home_layout() {
        let config = Config::for_home("/tmp/ts-home");
        assert_eq!(config.registry_path, PathBuf::from("/tmp/ts-home/tool_config.json"));
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/ts-home/sessions"));
        assert_eq!(config.sandbox.scratch_dir, PathBuf::from("/tmp/ts-home/scratch"));
        assert_eq!(config.sandbox.exec_timeout, Duration::from_secs(60));
    }
}
