//! Errors for language-model backends.

use std::sync::OnceLock;

use regex::Regex;

/// Longest response body kept in a [`BackendError::Status`].
pub const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("missing API key: set {env_var} or backend.api_key")]
    MissingApiKey { env_var: &'static str },

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("http transport error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Http(redact(&err.to_string()))
        }
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        BackendError::Status {
            status,
            body: truncate(&redact(body), MAX_ERROR_BODY),
        }
    }
}

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(sk-[A-Za-z0-9_\-]{8,}|(?i:bearer)\s+[A-Za-z0-9_\-\.]{8,})")
            .expect("static regex is valid")
    })
}

/// Mask API-key-shaped tokens.
pub fn redact(text: &str) -> String {
    secret_pattern().replace_all(text, "[REDACTED]").into_owned()
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
