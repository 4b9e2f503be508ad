//! Toolsmith CLI.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use toolsmith::agent::{Decision, FileSessionStore, new_session_id};
use toolsmith::cli::{
    Cli, Command, PromptCredentials, build_gate, default_checkpoint_path, print_finished,
    run_batch, run_interactive, run_resume, run_session_command, run_start, run_tools_command,
};
use toolsmith::config::Config;
use toolsmith::sandbox::EnvCredentials;
use toolsmith::tools::ToolRegistry;

fn init_tracing(debug: bool) {
    let default = if debug { "toolsmith=debug" } else { "toolsmith=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = Config::from_env()?;

    match cli.command {
        Command::Tools(cmd) => run_tools_command(cmd, &ToolRegistry::new(&config.registry_path)),
        Command::Session(cmd) => {
            run_session_command(cmd, &FileSessionStore::new(&config.sessions_dir)).await
        }
        Command::Run {
            query,
            session,
            max_turns,
        } => {
            let credentials = Arc::new(PromptCredentials::new(EnvCredentials::from_env()?));
            let gate = build_gate(&config, credentials)?;
            let session_id = session.unwrap_or_else(new_session_id);
            let budget = max_turns.unwrap_or(config.agent.max_turns);
            tracing::info!(session = %session_id, "Running query");

            let state = run_interactive(&gate, &query, &session_id, budget).await?;
            print_finished(&state);
            Ok(())
        }
        Command::Start {
            query,
            session,
            max_turns,
        } => {
            let gate = build_gate(&config, Arc::new(EnvCredentials::from_env()?))?;
            let session_id = session.unwrap_or_else(new_session_id);
            let budget = max_turns.unwrap_or(config.agent.max_turns);
            run_start(&gate, &query, &session_id, budget).await
        }
        Command::Resume {
            session_id,
            approve,
            reject: _,
            feedback,
        } => {
            let gate = build_gate(&config, Arc::new(EnvCredentials::from_env()?))?;
            let decision = if approve {
                Decision::approve()
            } else {
                Decision::reject(feedback)
            };
            run_resume(&gate, &session_id, decision).await
        }
        Command::Batch {
            file,
            checkpoint,
            fresh,
        } => {
            let credentials = Arc::new(PromptCredentials::new(EnvCredentials::from_env()?));
            let gate = build_gate(&config, credentials)?;
            let checkpoint = checkpoint.unwrap_or_else(|| default_checkpoint_path(&file));

            let results = run_batch(&gate, &file, &checkpoint, fresh).await?;
            println!();
            println!(
                "Processed {} question(s); checkpoint at {}",
                results.len(),
                checkpoint.display()
            );
            Ok(())
        }
    }
}
