//! Error types for toolsmith.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Language-model backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool registry storage errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to access registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Tool {name} cannot be stored: {reason}")]
    InvalidEntry { name: String, reason: String },
}

/// Sandboxed execution errors.
///
/// The executor converts these into failure results before they reach the
/// state machine; they only surface directly from the low-level runner.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to write scratch file {path}: {source}")]
    ScratchWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Credential {placeholder} is required but none was provided")]
    MissingCredential { placeholder: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Session {id} is not awaiting review (phase: {phase})")]
    NotAwaitingReview { id: String, phase: String },

    #[error("Session {0} already exists")]
    AlreadyExists(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Turn budget must be at least 1, got {0}")]
    InvalidBudget(u32),

    #[error("Session store I/O failed at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored session {id} could not be decoded: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
