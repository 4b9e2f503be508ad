//! CLI command handling.
//!
//! Provides subcommands for:
//! - Solving a query with interactive review (`run`)
//! - Resumable, non-interactive sessions (`start`, `resume`)
//! - Inspecting the tool registry (`tools list`, `tools show`)
//! - Inspecting stored sessions (`session show`, `session list`)
//! - Running a question file with checkpoints (`batch`)

mod batch;
mod interactive;
mod session;
mod tools;

pub use batch::{BatchCheckpoint, BatchRecord, BatchResult, default_checkpoint_path, run_batch};
pub use interactive::{PromptCredentials, ask_decision, print_suspension, run_interactive};
pub use session::{
    SessionCommand, print_finished, print_outcome, run_resume, run_session_command, run_start,
};
pub use tools::{ToolsCommand, run_tools_command};

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::agent::{AgentDeps, ApprovalGate, FileSessionStore, GateSettings};
use crate::config::Config;
use crate::llm::create_llm_provider;
use crate::sandbox::{CredentialSource, SandboxExecutor};
use crate::tools::{HttpDocRetriever, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "toolsmith")]
#[command(about = "Task-solving agent that writes its own tools, with human review")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging (toolsmith=debug unless RUST_LOG is set)
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve a query, reviewing generated tools at the terminal
    Run {
        query: String,

        /// Session id (defaults to a fresh one)
        #[arg(long)]
        session: Option<String>,

        /// Turn budget for tool generation
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Start a session and stop at the first review
    Start {
        query: String,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Answer the pending review of a session
    Resume {
        session_id: String,

        /// Approve the tool under review
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,

        /// Reject the tool under review
        #[arg(long)]
        reject: bool,

        /// Feedback for the next generation attempt
        #[arg(long, default_value = "")]
        feedback: String,
    },

    /// Inspect the tool registry
    #[command(subcommand)]
    Tools(ToolsCommand),

    /// Inspect stored sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Run every question in a JSONL file of {question, answer} records
    Batch {
        file: PathBuf,

        /// Checkpoint file (defaults to <file>.checkpoint.json)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Ignore any existing checkpoint
        #[arg(long)]
        fresh: bool,
    },
}

/// Wire the approval gate from configuration.
pub fn build_gate(
    config: &Config,
    credentials: Arc<dyn CredentialSource>,
) -> anyhow::Result<ApprovalGate> {
    let llm = create_llm_provider(&config.llm)?;
    let docs = HttpDocRetriever::new(config.docs.clone())?;
    let deps = AgentDeps {
        llm,
        registry: ToolRegistry::new(&config.registry_path),
        docs: Arc::new(docs),
        executor: Arc::new(SandboxExecutor::new(config.sandbox.clone(), credentials)),
        store: Arc::new(FileSessionStore::new(&config.sessions_dir)),
    };
    Ok(ApprovalGate::new(deps, GateSettings::from_config(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_needs_a_verdict() {
        assert!(Cli::try_parse_from(["toolsmith", "resume", "session_1"]).is_err());
        assert!(
            Cli::try_parse_from(["toolsmith", "resume", "session_1", "--approve", "--reject"])
                .is_err()
        );

        let cli = Cli::try_parse_from([
            "toolsmith",
            "resume",
            "session_1",
            "--reject",
            "--feedback",
            "missing error handling",
        ])
        .unwrap();
        match cli.command {
            Command::Resume {
                approve,
                reject,
                feedback,
                ..
            } => {
                assert!(!approve);
                assert!(reject);
                assert_eq!(feedback, "missing error handling");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_parses_budget() {
        let cli =
            Cli::try_parse_from(["toolsmith", "--debug", "run", "add 5 and 19", "--max-turns", "2"])
                .unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Run {
                max_turns: Some(2),
                ..
            }
        ));
    }
}
