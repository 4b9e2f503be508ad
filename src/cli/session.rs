//! Non-interactive session commands.

use clap::Subcommand;

use crate::agent::{ApprovalGate, Decision, Outcome, SessionState, SessionStore};

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Print a stored session as JSON
    Show { session_id: String },

    /// List stored session ids
    List,
}

pub async fn run_session_command(
    cmd: SessionCommand,
    store: &dyn SessionStore,
) -> anyhow::Result<()> {
    match cmd {
        SessionCommand::Show { session_id } => {
            let state = store
                .load(&session_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no session named {session_id}"))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        SessionCommand::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No stored sessions.");
            }
            for id in ids {
                match store.load(&id).await {
                    Ok(Some(state)) => println!("  {id}  {}  {}", state.phase, state.query),
                    Ok(None) => {}
                    Err(e) => println!("  {id}  (unreadable: {e})"),
                }
            }
        }
    }
    Ok(())
}

/// Start a session and report where it stopped.
pub async fn run_start(
    gate: &ApprovalGate,
    query: &str,
    session_id: &str,
    max_turns: u32,
) -> anyhow::Result<()> {
    let outcome = gate.start_with_budget(query, session_id, max_turns).await?;
    print_outcome(&outcome);
    Ok(())
}

pub async fn run_resume(
    gate: &ApprovalGate,
    session_id: &str,
    decision: Decision,
) -> anyhow::Result<()> {
    let outcome = gate.resume(session_id, decision).await?;
    print_outcome(&outcome);
    Ok(())
}

pub fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Finished(state) => print_finished(state),
        Outcome::Suspended(suspension) => {
            super::print_suspension(suspension);
            println!();
            println!(
                "Session {} is waiting for review. Continue with:",
                suspension.session_id
            );
            println!(
                "  toolsmith resume {} --approve | --reject --feedback \"...\"",
                suspension.session_id
            );
        }
    }
}

/// Print the answer and how the session ended.
pub fn print_finished(state: &SessionState) {
    println!();
    if let Some(answer) = &state.final_answer {
        println!("{answer}");
        println!();
    }
    if let Some(end_state) = state.end_state {
        println!("[{}] {}", end_state, end_state.message());
    }
}
