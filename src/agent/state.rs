//! Session state threaded through the approval gate.
//!
//! A session is one end-to-end run of a single query. Its state is a plain
//! serializable record: the gate persists it after every transition, so a
//! session suspended for human review can be resumed by another process.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::llm::ChatMessage;
use crate::tools::{ReviewNotes, ToolRequirement};

/// Most tools a single session may require.
pub const MAX_REQUIRED_TOOLS: usize = 3;

/// Position of a session in the approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    ResolveTools,
    GenerateTool,
    /// Suspended until an external decision arrives.
    HumanReview,
    Execute,
    Done,
    Aborted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Analyze => "analyze",
            Phase::ResolveTools => "resolve_tools",
            Phase::GenerateTool => "generate_tool",
            Phase::HumanReview => "human_review",
            Phase::Execute => "execute",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Outcome of the human review of the tool under review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    #[default]
    Unset,
    Approved,
    Rejected,
}

/// A reviewer's verdict on generated code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub approved: bool,
    #[serde(default)]
    pub feedback: String,
}

impl Decision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: String::new(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: feedback.into(),
        }
    }
}

/// Monotonic progress flags, used to skip phases already completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub tools_identified: bool,
    pub tools_generated: bool,
    pub tools_executed: bool,
    /// Result of the most recent synthesis attempt.
    pub code_generation_success: bool,
}

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    /// The query was answered without running any tool.
    NoToolsNeeded,
    /// Tools were prepared and run to answer the query.
    ToolsExecuted,
    /// The turn budget ran out before a usable tool set was ready.
    BudgetExhausted,
}

impl EndState {
    pub fn message(&self) -> &'static str {
        match self {
            EndState::NoToolsNeeded => "No tools were necessary; the query was answered directly.",
            EndState::ToolsExecuted => "Tools were generated or reused and executed to answer the query.",
            EndState::BudgetExhausted => {
                "Tool generation exhausted the retry budget without producing a usable tool."
            }
        }
    }
}

impl std::fmt::Display for EndState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndState::NoToolsNeeded => "no_tools_needed",
            EndState::ToolsExecuted => "tools_executed",
            EndState::BudgetExhausted => "budget_exhausted",
        };
        write!(f, "{s}")
    }
}

/// Everything the gate knows about one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub query: String,
    pub phase: Phase,
    /// Conversation so far: the query, model outputs and tool results.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    /// Remaining synthesis retries. Never negative; zero is terminal.
    pub max_turns: u32,
    #[serde(default)]
    pub required_tools: Vec<ToolRequirement>,
    #[serde(default)]
    pub approval: Approval,
    #[serde(default)]
    pub human_feedback: Option<String>,
    /// Index into `required_tools` of the tool being generated or reviewed.
    #[serde(default)]
    pub pending_tool: Option<usize>,
    #[serde(default)]
    pub progress: Progress,
    /// Tool names written to the registry during the current resolution pass.
    #[serde(default)]
    pub stored_this_pass: BTreeSet<String>,
    #[serde(default)]
    pub end_state: Option<EndState>,
    #[serde(default)]
    pub final_answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// A fresh session about to analyze `query`.
    pub fn new(
        session_id: impl Into<String>,
        query: impl Into<String>,
        max_turns: u32,
    ) -> Result<Self, SessionError> {
        if max_turns == 0 {
            return Err(SessionError::InvalidBudget(max_turns));
        }
        let query = query.into();
        let now = Utc::now();
        Ok(Self {
            session_id: session_id.into(),
            messages: vec![ChatMessage::user(query.clone())],
            query,
            phase: Phase::Analyze,
            subtasks: Vec::new(),
            max_turns,
            required_tools: Vec::new(),
            approval: Approval::Unset,
            human_feedback: None,
            pending_tool: None,
            progress: Progress::default(),
            stored_this_pass: BTreeSet::new(),
            end_state: None,
            final_answer: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// The tool currently being generated or reviewed.
    pub fn pending(&self) -> Option<&ToolRequirement> {
        self.pending_tool.and_then(|i| self.required_tools.get(i))
    }

    pub(crate) fn pending_mut(&mut self) -> Result<&mut ToolRequirement, SessionError> {
        let phase = self.phase;
        self.pending_tool
            .and_then(|i| self.required_tools.get_mut(i))
            .ok_or_else(|| SessionError::InvalidState(format!("no tool pending in phase {phase}")))
    }

    /// Spend one turn of the retry budget. Returns the remaining budget.
    pub(crate) fn consume_turn(&mut self) -> u32 {
        self.max_turns = self.max_turns.saturating_sub(1);
        self.max_turns
    }

    /// Move to the terminal aborted state.
    pub(crate) fn abort(&mut self, reason: &str) {
        let message = format!("{} Last failure: {}", EndState::BudgetExhausted.message(), reason);
        self.messages.push(ChatMessage::assistant(message.clone()));
        self.phase = Phase::Aborted;
        self.pending_tool = None;
        self.end_state = Some(EndState::BudgetExhausted);
        self.final_answer = Some(message);
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check the invariants that must hold at every transition.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |msg: String| Err(SessionError::InvalidState(msg));

        if self.session_id.trim().is_empty() {
            return invalid("empty session id".to_string());
        }
        if self.required_tools.len() > MAX_REQUIRED_TOOLS {
            return invalid(format!(
                "{} required tools, at most {MAX_REQUIRED_TOOLS} allowed",
                self.required_tools.len()
            ));
        }

        let mut names = BTreeSet::new();
        for tool in &self.required_tools {
            if !names.insert(tool.name.as_str()) {
                return invalid(format!("duplicate required tool '{}'", tool.name));
            }
            if tool.is_available && tool.function.trim().is_empty() {
                return invalid(format!("tool '{}' is available without code", tool.name));
            }
        }

        if self.max_turns == 0 && self.phase != Phase::Aborted {
            return invalid(format!("turn budget exhausted in phase {}", self.phase));
        }

        match self.phase {
            Phase::GenerateTool => {
                if self.pending().is_none() {
                    return invalid("generation without a pending tool".to_string());
                }
            }
            Phase::HumanReview => match self.pending() {
                Some(tool) if tool.is_executable() => {}
                Some(tool) => {
                    return invalid(format!("tool '{}' under review has no code", tool.name));
                }
                None => return invalid("review without a pending tool".to_string()),
            },
            Phase::Execute => {
                if let Some(tool) = self.required_tools.iter().find(|t| !t.is_executable()) {
                    return invalid(format!("executing with unavailable tool '{}'", tool.name));
                }
            }
            Phase::Done | Phase::Aborted => {
                if self.end_state.is_none() || self.final_answer.is_none() {
                    return invalid(format!("{} session has no end state", self.phase));
                }
            }
            Phase::Analyze | Phase::ResolveTools => {}
        }
        Ok(())
    }
}

/// A session paused for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub session_id: String,
    /// The generated tool awaiting a decision.
    pub tool: ToolRequirement,
    pub notes: ReviewNotes,
    pub turns_remaining: u32,
}

/// Result of driving a session as far as it can go.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The session reached `Done` or `Aborted`.
    Finished(Box<SessionState>),
    /// The session is waiting for `resume`.
    Suspended(Suspension),
}

impl Outcome {
    pub fn session_id(&self) -> &str {
        match self {
            Outcome::Finished(state) => &state.session_id,
            Outcome::Suspended(s) => &s.session_id,
        }
    }
}
