//! Scripted `LLMClient` stand-ins. [`FakeLlmClient`] replays a fixed
//! queue of responses; [`ConfusedFakeLlmClient`] reproduces the
//! "baseline picks the wrong metric" behavior a memory card is meant
//! to correct (§9 open question — this confusion is a testing
//! affordance, not something production code can trigger).

use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::llm::{CompletionRequest, CompletionResponse, LLMClient, LlmError};

/// Replays `responses` in order, one per `complete()` call. Panics-free:
/// once exhausted, every further call returns [`LlmError::NotConfigured`].
pub struct FakeLlmClient {
    responses: Mutex<Vec<String>>,
}

impl FakeLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut responses: Vec<String> = responses.into_iter().map(Into::into).collect();
        responses.reverse();
        Self { responses: Mutex::new(responses) }
    }

    pub fn single(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }
}

#[async_trait]
impl LLMClient for FakeLlmClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut queue = self.responses.lock().unwrap();
        let text = queue.pop().ok_or(LlmError::NotConfigured)?;
        Ok(CompletionResponse { text, latency_ms: 0, usage: None, raw: None })
    }
}

fn top_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)top\s+(\d+)").unwrap())
}

/// Pulls a `today=... this_month=start..end ... last_month=start..end`
/// context block back out of the augmented query the planner embeds,
/// mirroring `clock::StartPhase::augment`'s format.
fn extract_date_pair(prompt: &str, label: &str) -> Option<(String, String)> {
    let re = Regex::new(&format!(r"{label}=([0-9-]+)\.\.([0-9-]+)")).unwrap();
    let caps = re.captures(prompt)?;
    Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
}

/// A planner stand-in that defaults to the *wrong* metric (`units`
/// instead of `sales`) for "top products" style queries, unless the
/// prompt it is given contains a `Relevant memory:` section — i.e. the
/// leverager injected a correcting card. Every other query shape falls
/// through to a `list_products` plan, same as the real heuristic's
/// default branch.
pub struct ConfusedFakeLlmClient;

#[async_trait]
impl LLMClient for ConfusedFakeLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let has_memory = prompt.contains("Relevant memory:");
        let q = prompt.to_lowercase();

        if q.contains("top") && q.contains("product") {
            let metric = if has_memory { "sales" } else { "units" };
            let limit = top_n_re()
                .captures(&prompt)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(10);
            let (start, end) = extract_date_pair(&prompt, "last_month")
                .or_else(|| extract_date_pair(&prompt, "this_month"))
                .unwrap_or_else(|| ("2026-01-01".to_string(), "2026-01-31".to_string()));

            let text = serde_json::json!({
                "route": "data_presenter",
                "timeRange": {"startDate": start, "endDate": end},
                "steps": [{"tool": "top_products", "args": {"metric": metric, "startDate": start, "endDate": end, "limit": limit}}],
            })
            .to_string();
            return Ok(CompletionResponse { text, latency_ms: 0, usage: None, raw: None });
        }

        let text = serde_json::json!({
            "route": "data_presenter",
            "steps": [{"tool": "list_products", "args": {"limit": 20}}],
        })
        .to_string();
        Ok(CompletionResponse { text, latency_ms: 0, usage: None, raw: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::llm::Role;

    #[tokio::test]
    async fn fake_llm_replays_scripted_responses_in_order() {
        let client = FakeLlmClient::new(["first".to_string(), "second".to_string()]);
        let req = CompletionRequest::single_turn("x", "y");
        let a = client.complete(req).await.unwrap();
        assert_eq!(a.text, "first");
        let req = CompletionRequest::single_turn("x", "y");
        let b = client.complete(req).await.unwrap();
        assert_eq!(b.text, "second");
    }

    #[tokio::test]
    async fn fake_llm_errors_once_exhausted() {
        let client = FakeLlmClient::single("only");
        let _ = client.complete(CompletionRequest::single_turn("x", "y")).await.unwrap();
        let err = client.complete(CompletionRequest::single_turn("x", "y")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn confused_client_picks_units_without_memory_card() {
        let client = ConfusedFakeLlmClient;
        let request = CompletionRequest {
            instructions: None,
            messages: vec![Message { role: Role::User, content: "Query: top 5 products by sales last month".to_string() }],
            model: None,
            temperature: 0.0,
            max_output_tokens: None,
        };
        let resp = client.complete(request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&resp.text).unwrap();
        assert_eq!(value["steps"][0]["args"]["metric"], "units");
    }

    #[tokio::test]
    async fn confused_client_picks_sales_when_memory_card_present() {
        let client = ConfusedFakeLlmClient;
        let request = CompletionRequest {
            instructions: None,
            messages: vec![Message {
                role: Role::User,
                content: "Relevant memory:\nUse sales, not units, for 'top products' queries.\n\nQuery: top 5 products by sales last month".to_string(),
            }],
            model: None,
            temperature: 0.0,
            max_output_tokens: None,
        };
        let resp = client.complete(request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&resp.text).unwrap();
        assert_eq!(value["steps"][0]["args"]["metric"], "sales");
    }
}
