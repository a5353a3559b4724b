//! Completion service client (Anthropic Messages API)
//!
//! Sends one user message, returns the concatenated text blocks of the
//! answer. Calls pass through a per-client [`RequestGate`] and the shared
//! [`RetryPolicy`]; credential errors are never retried.

use super::request_gate::RequestGate;
use crate::error::CompletionError;
use cvmatch_common::config::AppConfig;
use cvmatch_common::RetryPolicy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Prompt → text capability
#[async_trait::async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

pub struct CompletionClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    gate: Arc<RequestGate>,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, CompletionError> {
        let http_client = Client::builder()
            .user_agent(concat!("cvmatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 1024,
            gate: Arc::new(RequestGate::unlimited()),
            retry: RetryPolicy::default(),
        })
    }

    /// Build from resolved configuration; the caller has already validated
    /// that a key is present.
    pub fn from_config(config: &AppConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .anthropic_api_key
            .clone()
            .ok_or_else(|| CompletionError::Authentication("completion API key not configured".to_string()))?;

        Ok(Self::new(&config.anthropic_base_url, api_key, &config.anthropic_model)?
            .with_max_tokens(config.anthropic_max_tokens)
            .with_gate(RequestGate::shared(config.completion_min_interval()))
            .with_retry(config.retry_policy()))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One request, no retry
    pub async fn complete_once(&self, prompt: &str) -> Result<String, CompletionError> {
        self.gate.wait().await;

        let url = format!("{}/messages", self.base_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        tracing::debug!(response_chars = text.len(), "Completion received");
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Completion for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.retry
            .run("completion request", CompletionError::is_retryable, || {
                self.complete_once(prompt)
            })
            .await
    }
}

fn classify_error(status: u16, body: &str) -> CompletionError {
    let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.kind, envelope.error.message),
        Err(_) => (String::new(), body.to_string()),
    };

    if status == 401
        || status == 403
        || kind == "authentication_error"
        || kind == "invalid_api_key"
    {
        let detail = if message.is_empty() { kind } else { message };
        return CompletionError::Authentication(detail);
    }

    CompletionError::Api {
        status,
        kind: if kind.is_empty() { "unknown".to_string() } else { kind },
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_structured_error() {
        let err = classify_error(
            400,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad model"}}"#,
        );
        assert_eq!(err.to_string(), "API error (status 400): invalid_request_error - bad model");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_authentication() {
        let err = classify_error(
            401,
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        );
        assert!(matches!(err, CompletionError::Authentication(ref m) if m == "invalid x-api-key"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_unstructured_body() {
        let err = classify_error(502, "Bad Gateway");
        assert!(matches!(
            err,
            CompletionError::Api { status: 502, ref kind, ref message } if kind == "unknown" && message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = CompletionClient::new("http://localhost:9/v1/", "k", "m").unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");
        assert_eq!(client.max_tokens, 1024);
    }
}
