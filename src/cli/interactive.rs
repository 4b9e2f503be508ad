//! Terminal review loop and credential prompt.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use secrecy::SecretString;

use crate::agent::{ApprovalGate, Decision, Outcome, SessionState, Suspension};
use crate::sandbox::{CredentialSource, EnvCredentials};
use crate::tools::{number_lines, review::Severity};

/// Uses `TOOL_API_KEY` when set, otherwise asks at the terminal.
pub struct PromptCredentials {
    env: EnvCredentials,
}

impl PromptCredentials {
    pub fn new(env: EnvCredentials) -> Self {
        Self { env }
    }
}

impl CredentialSource for PromptCredentials {
    fn credential(&self, placeholder: &str) -> Option<SecretString> {
        if let Some(value) = self.env.credential(placeholder) {
            return Some(value);
        }

        let mut rl = DefaultEditor::new().ok()?;
        println!();
        println!("This tool needs an API key (placeholder {placeholder}).");
        match rl.readline("API key: ") {
            Ok(line) if !line.trim().is_empty() => Some(SecretString::from(line.trim().to_string())),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Credential prompt failed: {}", e);
                None
            }
        }
    }
}

/// Show the tool under review with numbered code and review notes.
pub fn print_suspension(suspension: &Suspension) {
    let tool = &suspension.tool;
    println!();
    println!("\x1b[1mReview required:\x1b[0m {} ({})", tool.name, tool.kind);
    println!("  {}", tool.description);
    println!("  session {}, {} turn(s) left", suspension.session_id, suspension.turns_remaining);
    println!();
    println!("{}", number_lines(&tool.function));
    println!();

    let notes = &suspension.notes;
    if notes.requires_credential {
        println!("  note: this tool will ask for an API key when it runs");
    }
    for finding in &notes.findings {
        let colour = match finding.severity {
            Severity::High => "31",
            Severity::Medium => "33",
            Severity::Low => "90",
        };
        println!(
            "  \x1b[{colour}m{}\x1b[0m line {}: {} ({})",
            finding.severity, finding.line, finding.description, finding.pattern
        );
    }
    if notes.is_clean() && !notes.requires_credential {
        println!("  no review notes");
    }
}

/// Ask the reviewer for a verdict. Blocking.
pub fn ask_decision() -> anyhow::Result<Decision> {
    let mut rl = DefaultEditor::new()?;
    loop {
        let answer = match rl.readline("Approve this tool? [y/n] ") {
            Ok(line) => line.trim().to_lowercase(),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                anyhow::bail!("review cancelled")
            }
            Err(e) => return Err(e.into()),
        };

        match answer.as_str() {
            "y" | "yes" => return Ok(Decision::approve()),
            "n" | "no" => {
                let feedback = match rl.readline("What should change? ") {
                    Ok(line) => line,
                    Err(ReadlineError::Interrupted | ReadlineError::Eof) => String::new(),
                    Err(e) => return Err(e.into()),
                };
                return Ok(Decision::reject(feedback.trim()));
            }
            _ => println!("Please answer y or n."),
        }
    }
}

/// Drive a session to completion, asking for every review at the terminal.
pub async fn run_interactive(
    gate: &ApprovalGate,
    query: &str,
    session_id: &str,
    max_turns: u32,
) -> anyhow::Result<SessionState> {
    let mut outcome = gate.start_with_budget(query, session_id, max_turns).await?;
    loop {
        match outcome {
            Outcome::Finished(state) => return Ok(*state),
            Outcome::Suspended(suspension) => {
                print_suspension(&suspension);
                let decision = tokio::task::spawn_blocking(ask_decision).await??;
                outcome = gate.resume(&suspension.session_id, decision).await?;
            }
        }
    }
}
