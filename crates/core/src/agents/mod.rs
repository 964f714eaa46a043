//! Plan→execute→render wrappers. Grounded in the teacher's
//! `reasoning_loop.rs` wiring style: assemble collaborators, run,
//! return a typed result.

pub mod insight;
pub mod presenter;

use crate::run::{Plan, ToolCallRecord};
use crate::session::SessionState;

/// Shared shape returned by both agents: the rendered response text
/// and the session state to carry into the next step.
pub struct AgentOutcome {
    pub response: String,
    pub session: SessionState,
}

pub(crate) fn first_result<'a>(outcome: &'a crate::executor::ExecutionOutcome, tool: &str) -> Option<&'a serde_json::Value> {
    outcome.results_by_tool.get(tool)
}

pub(crate) fn plan_and_tool_calls(plan: &Plan, tool_calls: &[ToolCallRecord]) -> serde_json::Value {
    serde_json::json!({ "plan": plan, "toolCalls": tool_calls })
}
