//! Ollama backend implementation
//!
//! Uses Ollama's native `/api/chat` endpoint with streaming disabled, for
//! running the agent against a local model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

use super::openai_compatible::http_client;
use super::types::{ChatMessage, CompletionOptions};
use super::CompletionBackend;

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaBackend {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(config.timeout())?,
            base_url: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

/// Request to Ollama's chat API
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response from Ollama's chat API
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let temperature = options.temperature.or(self.temperature);
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: (temperature.is_some() || options.max_tokens.is_some()).then_some(
                OllamaOptions {
                    temperature,
                    num_predict: options.max_tokens,
                },
            ),
        };

        let response = self
            .http_client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Ollama returned {}: {}",
                status, text
            )));
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Malformed Ollama response: {}", e)))?;

        debug!(model = %self.model, response = %body.message.content, "Completion received");
        Ok(body.message.content)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
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
