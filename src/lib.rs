//! Toolsmith: a task-solving agent that writes its own tools.
//!
//! A query is decomposed, the tools it needs are looked up in a persistent
//! registry, and any missing tool is generated by a language model and
//! staged for human approval before it is ever run.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           Approval Gate                           │
//! │                                                                   │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────┐   ┌─────────┐  │
//! │  │ Decomposer │──▶│  Resolver   │──▶│ Synthesizer│──▶│ Review  │  │
//! │  └────────────┘   └──────┬──────┘   └─────┬──────┘   │(suspend)│  │
//! │                          │                │          └────┬────┘  │
//! │                          ▼                ▼               │       │
//! │                   ┌─────────────┐   ┌────────────┐        │       │
//! │                   │Tool Registry│   │    Docs    │        │       │
//! │                   └─────────────┘   └────────────┘        ▼       │
//! │                                                   ┌────────────┐  │
//! │                                                   │   Solver   │  │
//! │                                                   └─────┬──────┘  │
//! └─────────────────────────────────────────────────────────┼─────────┘
//!                                                           ▼
//!                                                  ┌─────────────────┐
//!                                                  │Sandbox Executor │
//!                                                  └─────────────────┘
//! ```
//!
//! Sessions are persisted after every transition, so the review step can be
//! answered by a later process through [`agent::ApprovalGate::resume`].

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod sandbox;
pub mod testing;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::agent::{ApprovalGate, Decision, EndState, Outcome, Phase, SessionState};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::llm::LlmProvider;
    pub use crate::sandbox::{ExecutionResult, SandboxExecutor};
    pub use crate::tools::{ToolRegistry, ToolRequirement};
}
