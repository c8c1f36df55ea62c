// src/extract/llm.rs
//! Chat-completion client seam. The pipeline treats the model as a
//! side-effecting `prompt → JSON | error` function; the only signal that
//! changes control flow is the rate limit, so that survives as a typed error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm api error: {0}")]
    Api(String),
}

impl LlmError {
    /// Back off on an explicit 429 or anything that mentions one.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::Transport(msg) | LlmError::Api(msg) => msg.contains("429"),
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
    /// Model identifier stamped into event provenance.
    fn model_version(&self) -> &str;
}

/// Determinism knobs for the extraction call.
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 500;

/// HTTP chat-completions provider.
pub struct HttpChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpChatClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(format!("http 429 from {}", self.api_url)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("http {status}: {body}")));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Api(format!("decode response: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Api("empty choices".into()))
    }

    fn model_version(&self) -> &str {
        &self.model
    }
}

/// Scripted client for tests: pops pre-seeded results in order.
pub struct MockChatClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockChatClient {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .lock()
            .expect("mock mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("mock exhausted".into())))
    }

    fn model_version(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection_covers_message_text() {
        assert!(LlmError::RateLimited("x".into()).is_rate_limit());
        assert!(LlmError::Api("upstream said 429 slow down".into()).is_rate_limit());
        assert!(!LlmError::Api("http 500".into()).is_rate_limit());
    }
}
