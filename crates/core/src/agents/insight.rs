//! Narrative generation grounded strictly on the plan and tool-call
//! JSON, with explicit instructions not to invent data.

use crate::executor::ExecutionOutcome;
use crate::llm::{CompletionRequest, LLMClient, LlmError};
use crate::run::Plan;
use crate::session::SessionState;

use super::{plan_and_tool_calls, AgentOutcome};

const PLACEHOLDER: &str = "Insight generation requires an LLM; none is configured for this run.";

const SYSTEM_PROMPT: &str = "\
You are a seller-analytics insight generator. Produce a short narrative grounded \
strictly on the JSON `{plan, toolCalls}` provided below. Do not invent data that \
is not present in the tool call results. Treat empty `rows`/`series` arrays as \
\"no data returned\" rather than inferring a value. When explaining a week-over-week \
drop, decompose using conversion_rate = units/sessions and price = sales/units.";

/// Plan→execute→narrate. Does not mutate session state (unlike the
/// Data Presenter, which owns `selectedProductIds`).
pub async fn generate(
    plan: &Plan,
    outcome: &ExecutionOutcome,
    session: SessionState,
    llm: Option<&dyn LLMClient>,
) -> Result<AgentOutcome, LlmError> {
    let Some(llm) = llm else {
        return Ok(AgentOutcome { response: PLACEHOLDER.to_string(), session });
    };

    let context = plan_and_tool_calls(plan, &outcome.tool_calls);
    let request = CompletionRequest::single_turn(SYSTEM_PROMPT, context.to_string());
    let response = llm.complete(request).await?;
    Ok(AgentOutcome { response: response.text, session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn no_llm_returns_placeholder() {
        let plan = Plan { route: "insight_generator".to_string(), time_range: None, steps: vec![], notes: None };
        let outcome = ExecutionOutcome { tool_calls: vec![], results_by_tool: HashMap::new() };
        let out = generate(&plan, &outcome, SessionState::default(), None).await.unwrap();
        assert_eq!(out.response, PLACEHOLDER);
    }

    #[tokio::test]
    async fn does_not_mutate_session() {
        let plan = Plan { route: "insight_generator".to_string(), time_range: None, steps: vec![], notes: None };
        let outcome = ExecutionOutcome { tool_calls: vec![], results_by_tool: HashMap::new() };
        let session = SessionState { selected_product_ids: vec![7, 8] };
        let out = generate(&plan, &outcome, session.clone(), None).await.unwrap();
        assert_eq!(out.session.selected_product_ids, vec![7, 8]);
    }
}
