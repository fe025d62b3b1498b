//! Language-model backends.
//!
//! A closed set of providers selected by [`BackendKind`] and resolved once at
//! construction by [`build_backend`]. Every provider implements
//! [`LanguageModel::send`].

pub mod anthropic;
pub mod error;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicBackend;
pub use error::{redact, BackendError};
pub use openai::OpenAiBackend;

/// Default completion budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            BackendKind::Anthropic => "ANTHROPIC_API_KEY",
            BackendKind::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::Anthropic => "https://api.anthropic.com",
            BackendKind::OpenAi => "https://api.openai.com",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Anthropic => write!(f, "anthropic"),
            BackendKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(BackendKind::Anthropic),
            "openai" => Ok(BackendKind::OpenAi),
            other => Err(format!("unknown backend '{other}' (expected anthropic|openai)")),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    /// Overrides the provider's public endpoint (tests, proxies).
    pub base_url: Option<String>,
    /// Falls back to the provider's environment variable when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::OpenAi,
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Explicit key, else the provider's environment variable.
    pub fn resolve_api_key(&self) -> Result<String, BackendError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(self.kind.api_key_env())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or(BackendError::MissingApiKey {
                env_var: self.kind.api_key_env(),
            })
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, BackendError> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn passed as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// `history` followed by `prompt` as the final user turn.
pub(crate) fn conversation(prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = history.to_vec();
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Capability shared by every backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn model(&self) -> &str;

    /// Send `prompt` after `history` and return the answer text.
    async fn send(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, BackendError>;
}

/// Construct the backend named by `config.kind`.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn LanguageModel>, BackendError> {
    Ok(match config.kind {
        BackendKind::Anthropic => Arc::new(AnthropicBackend::new(config.clone())?),
        BackendKind::OpenAi => Arc::new(OpenAiBackend::new(config.clone())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("anthropic".parse::<BackendKind>().unwrap(), BackendKind::Anthropic);
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("claude-3".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&BackendKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let kind: BackendKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, BackendKind::Anthropic);
    }

    #[test]
    fn test_explicit_key_wins() {
        let cfg = BackendConfig {
            api_key: Some("k-123".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap(), "k-123");
    }

    #[test]
    fn test_build_selects_kind() {
        let cfg = BackendConfig {
            kind: BackendKind::Anthropic,
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let backend = build_backend(&cfg).unwrap();
        assert_eq!(backend.kind(), BackendKind::Anthropic);
        assert_eq!(backend.model(), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let cfg = BackendConfig {
            base_url: Some("http://127.0.0.1:9/".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9");
    }
}
