//! Batch runs over a JSONL question file, resumable from a checkpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::{ApprovalGate, EndState, new_session_id};
use crate::cli::run_interactive;

/// One input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub question: String,
    /// Reference answer, carried through for later scoring.
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub question: String,
    pub correct_answer: String,
    pub answer: String,
    pub session_id: String,
    #[serde(default)]
    pub end_state: Option<EndState>,
}

/// Progress through a batch file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub results: Vec<BatchResult>,
    /// Index of the first line not yet processed.
    pub next_index: usize,
}

impl BatchCheckpoint {
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Default checkpoint path beside the input file.
pub fn default_checkpoint_path(file: &Path) -> PathBuf {
    file.with_extension("checkpoint.json")
}

/// Run every question in `file`, checkpointing after each one.
///
/// Lines that fail to parse or sessions that error are logged and skipped;
/// the checkpoint still moves past them.
pub async fn run_batch(
    gate: &ApprovalGate,
    file: &Path,
    checkpoint_path: &Path,
    fresh: bool,
) -> anyhow::Result<Vec<BatchResult>> {
    let lines: Vec<String> = std::fs::read_to_string(file)?
        .lines()
        .map(str::to_string)
        .collect();

    let mut checkpoint = if fresh {
        BatchCheckpoint::default()
    } else {
        BatchCheckpoint::load(checkpoint_path)?.unwrap_or_default()
    };
    if checkpoint.next_index > 0 {
        tracing::info!(
            next_index = checkpoint.next_index,
            done = checkpoint.results.len(),
            "Resuming batch from checkpoint"
        );
    }

    for index in checkpoint.next_index..lines.len() {
        let line = lines[index].trim();
        if !line.is_empty() {
            match serde_json::from_str::<BatchRecord>(line) {
                Ok(record) => {
                    println!("Question {}/{}: {}", index + 1, lines.len(), record.question);
                    if let Some(result) = run_record(gate, record).await {
                        checkpoint.results.push(result);
                    }
                }
                Err(e) => tracing::warn!(line = index + 1, "Skipping unparsable record: {}", e),
            }
        }
        checkpoint.next_index = index + 1;
        checkpoint.save(checkpoint_path)?;
    }

    Ok(checkpoint.results)
}

async fn run_record(gate: &ApprovalGate, record: BatchRecord) -> Option<BatchResult> {
    let session_id = new_session_id();
    let max_turns = gate.settings().max_turns;
    match run_interactive(gate, &record.question, &session_id, max_turns).await {
        Ok(state) => Some(BatchResult {
            question: record.question,
            correct_answer: record.answer,
            answer: state.final_answer.unwrap_or_default(),
            session_id,
            end_state: state.end_state,
        }),
        Err(e) => {
            tracing::warn!(session = %session_id, "Question failed: {:#}", e);
            None
        }
    }
}
