//! LLM chat-completions client.
//!
//! Speaks the OpenAI-compatible dialect (which the Anthropic-compatible
//! gateway deployments also expose). Rate limits, timeouts, and transient
//! 5xx responses are retried three times with `2·attempt`-second back-off;
//! schema problems are not retried.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 2;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM credentials missing")]
    MissingCredentials,

    #[error("LLM rate limited")]
    RateLimited,

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM transport error: {0}")]
    Http(String),

    #[error("LLM response missing expected fields: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<LlmError> for model::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingCredentials => model::Error::Auth("LLM credentials missing".into()),
            LlmError::MalformedResponse(msg) => model::Error::Parse(msg),
            other => model::Error::upstream("llm", other.to_string()),
        }
    }
}

/// A completed LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
}

/// The seam the analyzer talks through; swapped for a stub in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<LlmResponse, LlmError>;
}

/// Configuration for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingCredentials);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn attempt(&self, system: &str, user: &str) -> Result<LlmResponse, LlmError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user }
                ],
                "temperature": self.config.temperature,
                "max_tokens": self.config.max_tokens,
                "response_format": { "type": "json_object" }
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::MissingCredentials);
        }
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".into()))?;
        let tokens_used = chat.usage.map(|u| u.total_tokens).unwrap_or(0);

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tokens_used, "LLM call succeeded"
        );
        Ok(LlmResponse {
            content,
            tokens_used,
            model: chat.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<LlmResponse, LlmError> {
        let mut last_error = LlmError::Http("no attempt made".into());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(system, user).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_secs(BACKOFF_BASE_SECS * attempt as u64);
                    warn!(attempt, error = %e, backoff_secs = backoff.as_secs(), "LLM call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(uri: &str) -> LlmConfig {
        LlmConfig {
            api_url: uri.to_string(),
            api_key: "sk-test".into(),
            model: "gpt-4-turbo-preview".into(),
            temperature: 0.2,
            max_tokens: 2000,
        }
    }

    #[test]
    fn test_missing_key_rejected_at_construction() {
        let mut cfg = config("http://localhost");
        cfg.api_key.clear();
        assert!(matches!(OpenAiClient::new(cfg), Err(LlmError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4-turbo-preview",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4-turbo-preview",
                "choices": [ { "message": { "content": "{\"ok\":true}" } } ],
                "usage": { "total_tokens": 321 }
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(&server.uri())).unwrap();
        let response = client.complete("system", "user").await.unwrap();
        assert_eq!(response.content, "{\"ok\":true}");
        assert_eq!(response.tokens_used, 321);
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [ { "message": { "content": "{}" } } ],
                "usage": { "total_tokens": 10 }
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(&server.uri())).unwrap();
        let response = client.complete("s", "u").await.unwrap();
        assert_eq!(response.tokens_used, 10);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(&server.uri())).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 400, .. }));
    }
}
