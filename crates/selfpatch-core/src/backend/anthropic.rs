//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{conversation, BackendConfig, BackendError, BackendKind, ChatMessage, LanguageModel};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    config: BackendConfig,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let api_key = config.resolve_api_key()?;
        let client = config.http_client()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[async_trait]
impl LanguageModel for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, BackendError> {
        let messages = conversation(prompt, history);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: &messages,
        };

        debug!(model = %self.config.model, turns = messages.len(), "anthropic request");
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url()))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(BackendError::from_transport)?;
        if !status.is_success() {
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| BackendError::MalformedResponse("no text block in response".to_string()))
    }
}
