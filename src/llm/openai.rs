//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionClient, CompletionRequest, Message};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Completion client for any endpoint speaking the OpenAI chat API.
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Completion(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionsRequest {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            n: request.n,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        tracing::debug!(model = %self.config.model, messages = request.messages.len(), "chat completion request");

        let response = builder.send().await.map_err(|e| {
            Error::Completion(format!("failed to reach {}: {e}", self.config.base_url))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Completion(format!("API error ({status}): {error_text}")));
        }

        let chat: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| Error::Completion(format!("unreadable completion response: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Completion("no choices in response".into()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
