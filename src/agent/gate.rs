//! The approval gate: the state machine that takes a query from analysis
//! through tool resolution, generation and human review to execution.
//!
//! ```text
//!  ANALYZE ──▶ RESOLVE_TOOLS ──all available──▶ EXECUTE ──▶ DONE
//!                 ▲      │
//!        approved │      │ missing tool
//!                 │      ▼
//!          HUMAN_REVIEW ◀── GENERATE_TOOL ◀─┐
//!                 │  ▲          │ failed    │
//!        rejected │  │ (suspend)└───────────┤
//!                 └─────────────────────────┘
//!
//!  budget reaches 0 in GENERATE_TOOL or on rejection ──▶ ABORTED
//! ```
//!
//! The state is validated and persisted before every step. `HUMAN_REVIEW`
//! with no decision is the only place the gate returns without finishing;
//! [`ApprovalGate::resume`] picks the session up from the store.

use std::sync::Arc;

use crate::agent::decomposer::TaskDecomposer;
use crate::agent::resolver::RequirementResolver;
use crate::agent::solver::TaskSolver;
use crate::agent::state::{Approval, Decision, Outcome, Phase, SessionState, Suspension};
use crate::agent::store::SessionStore;
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::llm::{ChatMessage, LlmProvider};
use crate::sandbox::SandboxExecutor;
use crate::tools::{
    CodeSynthesizer, DocRetriever, SynthesisOutcome, SynthesisRequest, ToolRegistry, review_code,
};

/// Collaborators the gate drives.
pub struct AgentDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub registry: ToolRegistry,
    pub docs: Arc<dyn DocRetriever>,
    pub executor: Arc<SandboxExecutor>,
    pub store: Arc<dyn SessionStore>,
}

/// Tunables for one gate.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Initial turn budget for new sessions.
    pub max_turns: u32,
    pub max_tool_rounds: u32,
    pub validate_generated: bool,
    pub temperature: f32,
    pub max_doc_chars: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_turns: 5,
            max_tool_rounds: 5,
            validate_generated: false,
            temperature: 0.1,
            max_doc_chars: 10_000,
        }
    }
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_turns: config.agent.max_turns,
            max_tool_rounds: config.agent.max_tool_rounds,
            validate_generated: config.agent.validate_generated,
            temperature: config.llm.temperature,
            max_doc_chars: config.docs.max_chars,
        }
    }
}

pub struct ApprovalGate {
    settings: GateSettings,
    registry: ToolRegistry,
    store: Arc<dyn SessionStore>,
    decomposer: TaskDecomposer,
    resolver: RequirementResolver,
    synthesizer: CodeSynthesizer,
    solver: TaskSolver,
}

impl ApprovalGate {
    pub fn new(deps: AgentDeps, settings: GateSettings) -> Self {
        let mut synthesizer = CodeSynthesizer::new(Arc::clone(&deps.llm), deps.docs)
            .with_temperature(settings.temperature)
            .with_max_doc_chars(settings.max_doc_chars);
        if settings.validate_generated {
            synthesizer = synthesizer.with_validator(Arc::clone(&deps.executor));
        }

        Self {
            decomposer: TaskDecomposer::new(Arc::clone(&deps.llm), settings.temperature),
            resolver: RequirementResolver::new(
                Arc::clone(&deps.llm),
                deps.registry.clone(),
                settings.temperature,
            ),
            solver: TaskSolver::new(
                deps.llm,
                deps.executor,
                settings.temperature,
                settings.max_tool_rounds,
            ),
            synthesizer,
            registry: deps.registry,
            store: deps.store,
            settings,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Start a new session with the configured turn budget.
    pub async fn start(&self, query: &str, session_id: &str) -> Result<Outcome> {
        self.start_with_budget(query, session_id, self.settings.max_turns)
            .await
    }

    /// Start a new session with an explicit turn budget (at least 1).
    pub async fn start_with_budget(
        &self,
        query: &str,
        session_id: &str,
        max_turns: u32,
    ) -> Result<Outcome> {
        if query.trim().is_empty() {
            return Err(SessionError::InvalidState("empty query".to_string()).into());
        }
        if self.store.load(session_id).await?.is_some() {
            return Err(SessionError::AlreadyExists(session_id.to_string()).into());
        }

        let state = SessionState::new(session_id, query.trim(), max_turns)?;
        tracing::info!(session = %session_id, max_turns, "Starting session");
        self.drive(state).await
    }

    /// Continue a session suspended for review with the reviewer's decision.
    pub async fn resume(&self, session_id: &str, decision: Decision) -> Result<Outcome> {
        let mut state = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        state.validate()?;

        if state.phase != Phase::HumanReview || state.approval != Approval::Unset {
            return Err(SessionError::NotAwaitingReview {
                id: session_id.to_string(),
                phase: state.phase.to_string(),
            }
            .into());
        }

        tracing::info!(
            session = %session_id,
            approved = decision.approved,
            "Resuming session with review decision"
        );
        state.approval = if decision.approved {
            Approval::Approved
        } else {
            Approval::Rejected
        };
        let feedback = decision.feedback.trim();
        state.human_feedback = (!feedback.is_empty()).then(|| feedback.to_string());

        self.drive(state).await
    }

    /// Load a stored session without advancing it.
    pub async fn session(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.store.load(session_id).await?)
    }

    async fn drive(&self, mut state: SessionState) -> Result<Outcome> {
        loop {
            state.validate()?;
            state.touch();
            self.store.save(&state).await?;
            tracing::debug!(
                session = %state.session_id,
                phase = %state.phase,
                turns = state.max_turns,
                "Session step"
            );

            match state.phase {
                Phase::Analyze => self.analyze(&mut state).await,
                Phase::ResolveTools => self.resolve_tools(&mut state).await?,
                Phase::GenerateTool => self.generate_tool(&mut state).await?,
                Phase::HumanReview => {
                    if state.approval == Approval::Unset {
                        return suspend(&state);
                    }
                    self.apply_decision(&mut state)?;
                }
                Phase::Execute => self.execute(&mut state).await,
                Phase::Done | Phase::Aborted => {
                    tracing::info!(
                        session = %state.session_id,
                        phase = %state.phase,
                        end_state = ?state.end_state,
                        "Session finished"
                    );
                    return Ok(Outcome::Finished(Box::new(state)));
                }
            }
        }
    }

    async fn analyze(&self, state: &mut SessionState) {
        let subtasks = self.decomposer.decompose(&state.query).await;
        state
            .messages
            .push(ChatMessage::assistant(subtasks.join("\n")));
        state.subtasks = subtasks;
        state.phase = Phase::ResolveTools;
    }

    async fn resolve_tools(&self, state: &mut SessionState) -> Result<()> {
        state.stored_this_pass.clear();

        if state.progress.tools_identified {
            self.resolver.refresh(&mut state.required_tools)?;
        } else {
            state.required_tools = self.resolver.resolve(&state.query, &state.subtasks).await?;
            state.progress.tools_identified = true;
        }
        self.persist_available(state)?;

        match state.required_tools.iter().position(|t| !t.is_available) {
            Some(index) => {
                tracing::info!(
                    tool = %state.required_tools[index].name,
                    "Tool missing, generating"
                );
                state.pending_tool = Some(index);
                state.phase = Phase::GenerateTool;
            }
            None => {
                state.pending_tool = None;
                state.phase = Phase::Execute;
            }
        }
        Ok(())
    }

    /// Write available tools whose code the registry does not hold yet.
    fn persist_available(&self, state: &mut SessionState) -> Result<()> {
        let entries = self.registry.load()?;
        for tool in state.required_tools.iter().filter(|t| t.is_executable()) {
            if entries.iter().any(|e| e.function == tool.function) {
                continue;
            }
            self.registry.store(tool, &mut state.stored_this_pass)?;
        }
        Ok(())
    }

    async fn generate_tool(&self, state: &mut SessionState) -> Result<()> {
        let tool = state.pending_mut()?.clone();
        let previous_code = Some(tool.function.as_str()).filter(|c| !c.trim().is_empty());

        let outcome = self
            .synthesizer
            .synthesize(SynthesisRequest {
                tool: &tool,
                query: &state.query,
                feedback: state.human_feedback.as_deref(),
                previous_code,
            })
            .await;

        let reason = match outcome {
            SynthesisOutcome::Generated(code) => {
                let pending = state.pending_mut()?;
                if pending.make_available(code) {
                    let generated = pending.clone();
                    self.registry
                        .store(&generated, &mut state.stored_this_pass)?;

                    state.progress.tools_generated = true;
                    state.progress.code_generation_success = true;
                    state.approval = Approval::Unset;
                    state.human_feedback = None;
                    state.messages.push(ChatMessage::assistant(format!(
                        "Generated tool '{}' and staged it for review.",
                        generated.name
                    )));
                    state.phase = Phase::HumanReview;
                    return Ok(());
                }
                "generated code was empty".to_string()
            }
            SynthesisOutcome::Failed(reason) => reason,
        };

        state.progress.code_generation_success = false;
        let remaining = state.consume_turn();
        tracing::warn!(
            tool = %tool.name,
            remaining,
            "Tool generation failed: {}",
            reason
        );
        if remaining == 0 {
            state.abort(&format!("generating '{}' failed: {}", tool.name, reason));
        }
        Ok(())
    }

    fn apply_decision(&self, state: &mut SessionState) -> Result<()> {
        let approval = std::mem::take(&mut state.approval);
        let feedback = state.human_feedback.clone();
        let tool = state.pending_mut()?;
        let name = tool.name.clone();

        match approval {
            Approval::Approved => {
                tracing::info!(tool = %name, "Tool approved");
                state.messages.push(ChatMessage::user(format!("Tool '{name}' approved.")));
                state.pending_tool = None;
                state.human_feedback = None;
                state.phase = Phase::ResolveTools;
            }
            Approval::Rejected => {
                tool.revoke();
                state.stored_this_pass.remove(&name);
                let feedback = feedback.unwrap_or_else(|| "no feedback given".to_string());
                tracing::info!(tool = %name, feedback = %feedback, "Tool rejected");
                state.messages.push(ChatMessage::user(format!(
                    "Tool '{name}' rejected: {feedback}"
                )));

                if state.consume_turn() == 0 {
                    state.abort(&format!("tool '{name}' was rejected"));
                } else {
                    state.phase = Phase::GenerateTool;
                }
            }
            Approval::Unset => {
                return Err(SessionError::InvalidState(
                    "review applied without a decision".to_string(),
                )
                .into());
            }
        }
        Ok(())
    }

    async fn execute(&self, state: &mut SessionState) {
        let solution = self.solver.solve(&state.query, &state.required_tools).await;
        state.messages.extend(solution.transcript);
        state.progress.tools_executed = true;
        state.end_state = Some(solution.end_state);
        state.final_answer = Some(solution.answer);
        state.phase = Phase::Done;
    }
}

fn suspend(state: &SessionState) -> Result<Outcome> {
    let tool = state
        .pending()
        .ok_or_else(|| SessionError::InvalidState("review without a pending tool".to_string()))?;
    tracing::info!(
        session = %state.session_id,
        tool = %tool.name,
        "Suspending for human review"
    );
    Ok(Outcome::Suspended(Suspension {
        session_id: state.session_id.clone(),
        notes: review_code(&tool.function),
        tool: tool.clone(),
        turns_remaining: state.max_turns,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::EndState;
    use crate::agent::store::InMemorySessionStore;
    use crate::sandbox::SandboxConfig;
    use crate::testing::{ScriptedLlm, no_credentials};
    use crate::tools::StaticDocRetriever;
    use pretty_assertions::assert_eq;

    fn gate(dir: &std::path::Path, llm: Arc<ScriptedLlm>) -> ApprovalGate {
        let deps = AgentDeps {
            llm,
            registry: ToolRegistry::new(dir.join("tool_config.json")),
            docs: Arc::new(StaticDocRetriever::empty()),
            executor: Arc::new(SandboxExecutor::new(
                SandboxConfig::new(dir.join("scratch")).with_interpreter("sh"),
                no_credentials(),
            )),
            store: Arc::new(InMemorySessionStore::new()),
        };
        ApprovalGate::new(deps, GateSettings::default())
    }

    #[tokio::test]
    async fn test_no_tools_goes_straight_to_execute() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["1. Greet the user", "```json\n[]\n```", "Hello!"]));
        let gate = gate(dir.path(), llm);

        let Outcome::Finished(state) = gate.start("Say hello", "s1").await.unwrap() else {
            panic!("expected a finished session");
        };
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(state.end_state, Some(EndState::NoToolsNeeded));
        assert_eq!(state.final_answer.as_deref(), Some("Hello!"));
        assert_eq!(state.max_turns, 5);
    }

    #[tokio::test]
    async fn test_duplicate_session_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["1. a", "[]", "done"]));
        let gate = gate(dir.path(), llm);
        gate.start("q", "s1").await.unwrap();

        let err = gate.start("q", "s1").await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Session(SessionError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_pending_review() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["1. a", "[]", "done"]));
        let gate = gate(dir.path(), llm);

        assert!(matches!(
            gate.resume("missing", Decision::approve()).await,
            Err(crate::Error::Session(SessionError::NotFound(_)))
        ));

        gate.start("q", "s1").await.unwrap();
        assert!(matches!(
            gate.resume("s1", Decision::approve()).await,
            Err(crate::Error::Session(SessionError::NotAwaitingReview { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejection_at_last_turn_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([
            "1. Add numbers",
            "```json\n[{\"name\": \"Adder\", \"description\": \"adds numbers\"}]\n```",
            "```python\necho 24\n```",
        ]));
        let gate = gate(dir.path(), llm.clone());

        let outcome = gate.start_with_budget("add", "s1", 1).await.unwrap();
        assert!(matches!(outcome, Outcome::Suspended(_)));

        let Outcome::Finished(state) = gate
            .resume("s1", Decision::reject("wrong language"))
            .await
            .unwrap()
        else {
            panic!("expected the session to finish");
        };
        assert_eq!(state.phase, Phase::Aborted);
        assert_eq!(state.max_turns, 0);
        assert_eq!(state.end_state, Some(EndState::BudgetExhausted));
        assert_eq!(llm.remaining(), 0);
        assert_eq!(llm.calls(), 3);
    }
}
