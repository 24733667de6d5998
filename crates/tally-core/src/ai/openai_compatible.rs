//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API,
//! including hosted gateways (DashScope compatible mode, university
//! gateways) and local servers (vLLM, LocalAI, llama-server).
//!
//! Requests go to `{host}/v1/chat/completions` with an optional bearer key.
//! Provider-specific switches (`enable_thinking` and the like) come from the
//! provider's `extra_body` table and are merged into the top level of the
//! request body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{ProviderConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};

use super::types::{ChatMessage, CompletionOptions};
use super::CompletionBackend;

/// OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    extra_body: Map<String, Value>,
}

impl OpenAICompatibleBackend {
    /// Create a backend with the default timeout and no API key
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            http_client: http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            extra_body: Map::new(),
        })
    }

    /// Create from a configured provider; the API key is read from its
    /// environment variable now
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(config.timeout())?,
            base_url: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
            temperature: config.temperature,
            extra_body: config.extra_body.clone(),
        })
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &CompletionOptions,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature.or(self.temperature),
            max_tokens: options.max_tokens,
            stream: false,
            extra: &self.extra_body,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Request body for `/v1/chat/completions`
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
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
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionBackend for OpenAICompatibleBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut builder = self
            .http_client
            .post(&url)
            .json(&self.request(messages, options));
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "{} returned {}: {}",
                self.model, status, text
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Malformed completion response: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Provider("Completion response has no choices".into()))?;

        debug!(model = %self.model, response = %content, "Completion received");
        Ok(content)
    }

    async fn health_check(&self) -> bool {
        // Try /v1/models first (standard OpenAI endpoint)
        let mut builder = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        if let Ok(resp) = builder.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Some local servers only answer /health
        match self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
