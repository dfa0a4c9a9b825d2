//! Language-model providers.
//!
//! The fan-out only depends on [`ModelProvider`]; the OpenAI-compatible
//! chat-completions client below is the production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PredictError, Result};

/// Anything that can answer a prompt with raw text for a given model id.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name, for logs and health output.
    fn name(&self) -> &str;

    /// Send `prompt` to `model_id` and return the raw reply text.
    async fn query_model(&self, model_id: &str, prompt: &str) -> Result<String>;
}

/// Configuration for the chat-completions client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: Some(600),
            timeout_seconds: 30,
        }
    }
}

impl From<&crate::config::ModelsConfig> for ProviderConfig {
    fn from(config: &crate::config::ModelsConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

/// Message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client with JSON-mode replies.
pub struct OpenAiProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        info!("Initializing model provider at {}", config.base_url);

        if config.api_key.is_none() {
            warn!("No LLM API key configured; requests may be rejected");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    fn build_request<'a>(&self, model_id: &'a str, prompt: &str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: model_id,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: ANALYST_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn query_model(&self, model_id: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = self.build_request(model_id, prompt);

        debug!("Sending completion request to {} ({})", model_id, url);

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PredictError::from_reqwest(e, self.config.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::Upstream { status, body });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PredictError::from_reqwest(e, self.config.timeout_seconds))?;

        extract_content(completion)
    }
}

fn extract_content(completion: ChatCompletionResponse) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| PredictError::Malformed("completion has no content".to_string()))
}

/// System turn sent with every analysis prompt.
pub const ANALYST_SYSTEM_PROMPT: &str = r#"You are an expert cryptocurrency market analyst.
Analyze the provided token market data and price history and predict the short-term price direction.
Respond with a single JSON object only, no markdown and no explanations outside the JSON."#;
