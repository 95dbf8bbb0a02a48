//! Completion gateway: prompt text in, model text out.
//!
//! The orchestrator depends only on [`CompletionGateway`]. Two
//! implementations ship with the crate:
//! - **[`DisabledCompletion`]**: fails every call; used when no provider is configured.
//! - **[`OpenAiCompletion`]**: any OpenAI-compatible `/chat/completions` endpoint.
//!
//! Deadlines and retries belong to the gateway client, not to the caller.
//! The OpenAI client retries 429/5xx responses and network errors with
//! exponential backoff (1s, 2s, 4s, ...) up to `completion.max_retries`
//! times, and fails immediately on any other 4xx.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CompletionConfig;

/// Why a completion call failed.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion provider is disabled; set [completion] provider in config")]
    Disabled,

    #[error("completion provider misconfigured: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A synchronous (from the caller's view) text-completion capability.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Gateway used when completions are not configured.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionGateway for DisabledCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

/// OpenAI-compatible chat completions client.
///
/// The whole prompt is sent as a single user message.
pub struct OpenAiCompletion {
    model: String,
    url: String,
    api_key: String,
    temperature: Option<f32>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    /// Build a client from config, reading `OPENAI_API_KEY` from the environment.
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| CompletionError::Config("OPENAI_API_KEY not set".into()))?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn with_api_key(
        config: &CompletionConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| CompletionError::Config("completion.model required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Config(e.to_string()))?;

        Ok(Self {
            model,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".into()))
}

#[async_trait]
impl CompletionGateway for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = self.request_body(prompt);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            debug!(model = %self.model, chars = prompt.len(), attempt, "completion request");

            let response = match self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, attempt, "completion request failed");
                    last_err = Some(CompletionError::Network(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| CompletionError::Network(e.to_string()))?;

            if status.is_success() {
                return parse_completion(&text);
            }

            let err = CompletionError::Api {
                status: status.as_u16(),
                message: text,
            };

            if status.as_u16() == 429 || status.is_server_error() {
                warn!(%status, attempt, "completion provider error, retrying");
                last_err = Some(err);
                continue;
            }

            return Err(err);
        }

        Err(last_err
            .unwrap_or_else(|| CompletionError::Network("completion failed after retries".into())))
    }
}

/// Build the completion gateway the configuration asks for.
pub fn create_completion(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionGateway>, CompletionError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(OpenAiCompletion::new(config)?)),
        other => Err(CompletionError::Config(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}
