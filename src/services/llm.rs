//! LLM client used by the usage judge
//!
//! Thin wrapper over the Anthropic messages API. It only knows how to send a
//! prompt and classify failures; retry policy lives in the judge runner.

use crate::config::JudgeConfig;
use crate::error::{Result, VocabError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for LLM service
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Anthropic API key
    pub api_key: String,

    /// API base URL, without the trailing `/messages`
    pub base_url: String,

    /// Model to use
    pub model: String,

    /// Max tokens for responses
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,

    /// Per-request timeout
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn from_judge_config(judge: &JudgeConfig) -> Result<Self> {
        Ok(Self {
            api_key: judge.resolve_api_key()?,
            base_url: judge.base_url.trim_end_matches('/').to_string(),
            model: judge.model.clone(),
            max_tokens: judge.max_tokens,
            temperature: judge.temperature,
            timeout: Duration::from_secs(judge.timeout_secs),
        })
    }
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
}

/// LLM service for usage judgments
pub struct LlmService {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(VocabError::Config("judge API key not set".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VocabError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one prompt and return the first text block of the reply
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!("Calling judge model {}", self.config.model);

        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| VocabError::MalformedJudgment(format!("Failed to parse response: {}", e)))?;

        api_response
            .content
            .into_iter()
            .map(|c| c.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| VocabError::MalformedJudgment("Empty response from API".to_string()))
    }
}

fn classify_send_error(e: reqwest::Error) -> VocabError {
    if e.is_timeout() {
        VocabError::Timeout(e.to_string())
    } else {
        VocabError::NetworkError(e.to_string())
    }
}

/// Map an HTTP failure status onto the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> VocabError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            VocabError::RateLimitExceeded(format!("status {}: {}", status, body))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            VocabError::Timeout(format!("status {}", status))
        }
        // 5xx, including 529 overloaded
        s if s.is_server_error() => {
            VocabError::NetworkError(format!("server error {}: {}", status, body))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VocabError::JudgeApi("Invalid or missing API key".to_string())
        }
        _ => VocabError::JudgeApi(format!(
            "API request failed with status {}: {}",
            status, body
        )),
    }
}
