//! OpenAI Chat Completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{conversation, BackendConfig, BackendError, BackendKind, ChatMessage, LanguageModel};

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: BackendConfig,
    api_key: String,
}

impl OpenAiBackend {
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
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, BackendError> {
        let messages = conversation(prompt, history);
        let request = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: &messages,
        };

        debug!(model = %self.config.model, turns = messages.len(), "openai request");
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url()))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(BackendError::from_transport)?;
        if !status.is_success() {
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("no choices in response".to_string()))
    }
}
