//! Language model backends.
//!
//! Generation is called at most once per query. Failures are not retried
//! because the user has already been charged by the time it runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::UpstreamError;

/// Input to a single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model id
    pub model: String,
    /// Full assembled prompt, sent as the system message
    pub prompt: String,
    /// Completion budget
    pub max_tokens: u64,
    /// Sampling temperature
    pub temperature: f32,
}

/// Model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text; may be empty
    pub text: String,
    /// Completion units reported by the model, if any
    pub completion_units: Option<u64>,
}

/// A chat completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError>;
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from configuration.
    pub fn new(config: &LlmConfig) -> Result<Self, UpstreamError> {
        if config.api_key.trim().is_empty() {
            return Err(UpstreamError::NotConfigured("llm.api_key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u64,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    completion_tokens: Option<u64>,
}

impl ChatResponse {
    fn into_completion(self) -> Completion {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        Completion {
            text: text.trim().to_string(),
            completion_units: self.usage.and_then(|u| u.completion_tokens),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: "system",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        debug!(model = %request.model, max_tokens = request.max_tokens, "Calling language model");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        let text = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| UpstreamError::decode(e.to_string()))?;
        Ok(parsed.into_completion())
    }
}
