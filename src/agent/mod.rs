//! Core agent logic.
//!
//! A query moves through:
//! - Task decomposition into at most three subtasks
//! - Tool requirement resolution against the registry
//! - Code synthesis for missing tools, each staged for human review
//! - Final execution, where the model calls the approved tools
//!
//! [`ApprovalGate`] owns the control flow; everything else is a step it
//! calls. Sessions are persisted through a [`SessionStore`] so a review can
//! be answered by a later process.

mod decomposer;
mod gate;
mod resolver;
mod solver;
pub mod state;
mod store;

pub use decomposer::{MAX_SUBTASKS, TaskDecomposer, parse_subtasks};
pub use gate::{AgentDeps, ApprovalGate, GateSettings};
pub use resolver::{RequirementResolver, parse_tool_specs};
pub use solver::{Solution, TaskSolver};
pub use state::{
    Approval, Decision, EndState, MAX_REQUIRED_TOOLS, Outcome, Phase, Progress, SessionState,
    Suspension,
};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};

/// A new session id of the form `session_<uuid>`.
pub fn new_session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}
