//! Sandboxed execution of generated tool code.
//!
//! ```text
//! code ──► credential placeholder? ──► scratch file ──► <interpreter> file
//!                 │                                         │
//!          CredentialSource                        timeout / exit status
//!                                                           │
//!                                          ExecutionResult { success, output }
//! ```
//!
//! Isolation is process-level only: the child runs with the scratch
//! directory as its working directory and a hard wall-clock limit.

pub mod config;
pub mod credentials;
pub mod executor;

pub use config::{ExecutionMode, SandboxConfig};
pub use credentials::{
    CREDENTIAL_PLACEHOLDER, CredentialSource, EnvCredentials, StaticCredentials, needs_credential,
};
pub use executor::{ExecutionResult, SandboxExecutor, TOOL_ARGS_ENV};
