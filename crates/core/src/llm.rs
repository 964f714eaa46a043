//! The `LLMClient` boundary the planner, manager, and insight generator
//! consume. [`HttpLlmClient`] is grounded in the teacher's
//! `http_input/llm_client.rs`: provider auto-detection from env vars,
//! POSTing an OpenAI-compatible `/v1/chat/completions` body (or
//! Anthropic's `/v1/messages`) via `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no LLM provider configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    BadResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// `complete` request. `system` messages are folded into
/// `instructions` by the caller before this point — the trait only
/// sees `user`/`assistant` turns.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub instructions: Option<String>,
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: f64,
    pub max_output_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn single_turn(instructions: impl Into<String>, user_content: impl Into<String>) -> Self {
        Self {
            instructions: Some(instructions.into()),
            messages: vec![Message { role: Role::User, content: user_content.into() }],
            model: None,
            temperature: 0.0,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub latency_ms: i64,
    pub usage: Option<Value>,
    pub raw: Option<Value>,
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenRouter,
    OpenAi,
    Anthropic,
}

impl Provider {
    fn base_url(self) -> &'static str {
        match self {
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openai/gpt-4o-mini",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
        }
    }
}

/// HTTP-backed `LLMClient`. Provider is auto-detected at construction
/// time from whichever API key env var is set, checked in the order
/// `OPENROUTER_API_KEY`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: Provider,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: Option<Value>,
}

impl HttpLlmClient {
    /// Builds a client from environment variables, or returns
    /// `Ok(None)` when no provider key is set (demo mode falls back to
    /// the heuristic/fixed-response paths rather than erroring).
    pub fn from_env() -> Result<Option<Self>, LlmError> {
        let (provider, api_key) = if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            (Provider::OpenRouter, key)
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            (Provider::OpenAi, key)
        } else if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            (Provider::Anthropic, key)
        } else {
            return Ok(None);
        };

        let model = std::env::var("ANALYST_LLM_MODEL").unwrap_or_else(|_| provider.default_model().to_string());
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Some(Self { client, provider, api_key, model }))
    }

    async fn complete_openai_compatible(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let started = std::time::Instant::now();
        let mut messages = Vec::new();
        if let Some(instructions) = &request.instructions {
            messages.push(ChatMessage { role: "system", content: instructions });
        }
        for m in &request.messages {
            messages.push(ChatMessage { role: m.role.as_str(), content: &m.content });
        }

        let body = ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url()))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let parsed: ChatResponse = resp.json().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("no choices in response".to_string()))?;

        Ok(CompletionResponse {
            text,
            latency_ms: started.elapsed().as_millis() as i64,
            usage: parsed.usage,
            raw: None,
        })
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let started = std::time::Instant::now();
        let messages: Vec<ChatMessage> =
            request.messages.iter().map(|m| ChatMessage { role: m.role.as_str(), content: &m.content }).collect();

        let body = AnthropicRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            system: request.instructions.as_deref(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens.unwrap_or(1024),
        };

        let resp = self
            .client
            .post(format!("{}/messages", self.provider.base_url()))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let parsed: AnthropicResponse = resp.json().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|b| b.text)
            .ok_or_else(|| LlmError::BadResponse("no content blocks in response".to_string()))?;

        Ok(CompletionResponse {
            text,
            latency_ms: started.elapsed().as_millis() as i64,
            usage: parsed.usage,
            raw: None,
        })
    }
}

#[async_trait]
impl LLMClient for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.provider {
            Provider::OpenRouter | Provider::OpenAi => self.complete_openai_compatible(&request).await,
            Provider::Anthropic => self.complete_anthropic(&request).await,
        }
    }
}
